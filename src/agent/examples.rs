//! Versioned few-shot catalogue embedded in the binary.

use serde::Deserialize;

const CATALOGUE_YAML: &str = include_str!("few_shot.yaml");

/// What kind of query an example demonstrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExampleCategory {
    SimpleFilter,
    Aggregation,
    Join,
    DateRange,
    TopN,
}

impl ExampleCategory {
    pub const ALL: [ExampleCategory; 5] = [
        ExampleCategory::SimpleFilter,
        ExampleCategory::Aggregation,
        ExampleCategory::Join,
        ExampleCategory::DateRange,
        ExampleCategory::TopN,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FewShotExample {
    pub category: ExampleCategory,
    pub input: String,
    pub sql: String,
    pub sql_result: String,
    pub answer: String,
    pub table_info: String,
}

impl FewShotExample {
    fn render(&self) -> String {
        format!(
            "Schema:\n{}\nQuestion: {}\nSQLQuery: {}\nSQLResult: {}\nAnswer: {}",
            self.table_info.trim_end(),
            self.input.trim(),
            self.sql.trim(),
            self.sql_result.trim(),
            self.answer.trim()
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FewShotCatalogue {
    pub version: u32,
    pub examples: Vec<FewShotExample>,
}

impl FewShotCatalogue {
    /// Parse the catalogue shipped with the crate.
    pub fn builtin() -> Result<Self, serde_yaml::Error> {
        Self::from_yaml(CATALOGUE_YAML)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// All examples as one prompt block, in catalogue order.
    pub fn render(&self) -> String {
        self.examples
            .iter()
            .map(FewShotExample::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
