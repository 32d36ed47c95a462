use crate::config::LanguageConfig;

/// Columns (as indices into the table shape) claimed by one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LanguageGroup {
    pub(crate) language: String,
    pub(crate) columns: Vec<usize>,
}

/// Every column sits in exactly one language group or in `shared`.
/// `identifiers` is computed independently and may overlap both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnClassification {
    pub(crate) languages: Vec<LanguageGroup>,
    pub(crate) shared: Vec<usize>,
    pub(crate) identifiers: Vec<usize>,
}

pub(crate) fn partition_columns(
    columns: &[String],
    config: &LanguageConfig,
) -> ColumnClassification {
    let mut languages = config
        .languages
        .iter()
        .map(|entry| LanguageGroup {
            language: entry.language.clone(),
            columns: Vec::new(),
        })
        .collect::<Vec<LanguageGroup>>();
    let mut shared = Vec::new();

    for (index, column) in columns.iter().enumerate() {
        let claimed_by = config.languages.iter().position(|entry| {
            entry
                .suffixes
                .iter()
                .any(|suffix| column.ends_with(suffix.as_str()))
        });

        match claimed_by {
            Some(position) => languages[position].columns.push(index),
            None => shared.push(index),
        }
    }

    ColumnClassification {
        languages,
        shared,
        identifiers: identifier_columns(columns),
    }
}

/// Columns whose name ends in `id`, in table order.
pub(crate) fn identifier_columns(columns: &[String]) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .filter(|(_, column)| column.ends_with("id"))
        .map(|(index, _)| index)
        .collect()
}
