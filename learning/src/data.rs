//! Loading of the heart rate variability dataset every participant reads from disk.
//!
//! The dataset is split by feature family into three CSV files sharing an id column,
//! once for the train set and once for the test set.

use std::path::{Path, PathBuf};

use log::info;

use crate::{
    Result,
    dataset::{Dataset, train_test_split},
    preprocessing::{LabelEncoder, StandardScaler},
    table::Table,
};

pub const TRAIN_DIR: &str = "data/Train Data/Train Data Zip";
pub const TEST_DIR: &str = "data/Test Data/Test Zip";

const FEATURE_FILES: [&str; 3] = [
    "frequency_domain_features",
    "heart_rate_non_linear_features",
    "time_domain_features",
];

/// Where the CSV files of each set live.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPaths {
    pub train: Vec<PathBuf>,
    pub test: Vec<PathBuf>,
}

impl DataPaths {
    /// The fixed dataset layout under `root`.
    pub fn under(root: &Path) -> Self {
        let files = |dir: &str, suffix: &str| {
            FEATURE_FILES
                .iter()
                .map(|name| root.join(dir).join(format!("{name}_{suffix}.csv")))
                .collect()
        };

        Self {
            train: files(TRAIN_DIR, "train"),
            test: files(TEST_DIR, "test"),
        }
    }
}

/// How the merged tables are turned into a labeled dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub id_column: String,
    pub label_column: String,
    /// Columns that are neither features nor labels.
    pub drop_columns: Vec<String>,
    pub test_size: f32,
    pub seed: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            id_column: "uuid".to_string(),
            label_column: "condition".to_string(),
            drop_columns: vec!["HR".to_string()],
            test_size: 0.2,
            seed: 42,
        }
    }
}

/// The scaled and split dataset, along with what its columns and labels mean.
#[derive(Debug, Clone)]
pub struct LabeledData {
    pub train: Dataset,
    pub test: Dataset,
    pub classes: Vec<String>,
    pub feature_names: Vec<String>,
}

impl LabeledData {
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}

/// Inner joins every table on `key`, left to right.
pub fn merge_all(tables: &[Table], key: &str) -> Result<Table> {
    let Some((first, rest)) = tables.split_first() else {
        return Table::new("empty", Vec::new(), Vec::new());
    };

    rest.iter()
        .try_fold(first.clone(), |merged, table| merged.merge(table, key))
}

fn read_all(paths: &[PathBuf]) -> Result<Vec<Table>> {
    paths.iter().map(|p| Table::from_path(p)).collect()
}

/// Reads, merges and prepares the dataset at `paths`.
pub fn load_data(paths: &DataPaths, options: &LoadOptions) -> Result<LabeledData> {
    let train = merge_all(&read_all(&paths.train)?, &options.id_column)?;
    let test = merge_all(&read_all(&paths.test)?, &options.id_column)?;

    info!(train_rows = train.len(), test_rows = test.len(); "loaded dataset tables");
    prepare(&train, &test, options)
}

/// Turns the merged train and test tables into a labeled dataset.
///
/// The label encoder learns the labels of both tables so every class is known, the
/// features come from the train table only. They are standardized and then split into
/// train and test sets stratified by label.
pub fn prepare(train: &Table, test: &Table, options: &LoadOptions) -> Result<LabeledData> {
    let train_labels = train.column(&options.label_column)?;
    let test_labels = test.column(&options.label_column)?;

    let encoder = LabelEncoder::fit(train_labels.iter().chain(&test_labels).copied());
    let y = encoder.transform(train_labels)?;

    let mut dropped = vec![options.id_column.as_str(), options.label_column.as_str()];
    dropped.extend(options.drop_columns.iter().map(String::as_str));

    let features = train.drop(&dropped)?;
    let feature_names = features.columns().to_vec();
    let names: Vec<&str> = feature_names.iter().map(String::as_str).collect();

    let x = features.to_matrix(&names)?;
    let (_, x) = StandardScaler::fit_transform(x.view())?;

    let dataset = Dataset::new(x, y)?;
    let (train, test) = train_test_split(&dataset, options.test_size, options.seed, true)?;

    info!(
        train = train.len(),
        test = test.len(),
        features = feature_names.len(),
        classes = encoder.classes().len();
        "prepared dataset"
    );

    Ok(LabeledData {
        train,
        test,
        classes: encoder.classes().to_vec(),
        feature_names,
    })
}
