mod loader;
mod run;

pub use run::run;
