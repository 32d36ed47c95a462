mod batcher;
mod compose;
mod partition;
mod run;
#[cfg(test)]
mod tests;

pub use compose::UNKNOWN_LANGUAGE;
pub use run::run;
