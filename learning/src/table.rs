//! A small string table read from CSV files, with just the relational operations the
//! data loading needs: inner joins on a key column, unions and column projections.

use std::{collections::HashMap, fs::File, io, path::Path};

use ndarray::Array2;

use crate::{MlErr, Result};

/// Rows of raw CSV cells under a header.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates a new `Table`.
    ///
    /// # Arguments
    /// * `name` - The table's name, used in error messages.
    /// * `columns` - The header.
    /// * `rows` - The cells, every row must be as wide as the header.
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some(row) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(MlErr::SizeMismatch {
                a: "row",
                b: "header",
                got: row.len(),
                expected: columns.len(),
            });
        }

        Ok(Self {
            name: name.into(),
            columns,
            rows,
        })
    }

    /// Reads a CSV with a header row out of `reader`.
    pub fn from_reader<R: io::Read>(name: impl Into<String>, reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|record| Ok(record?.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>>>()?;

        Self::new(name, columns, rows)
    }

    /// Reads the CSV file at `path`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| MlErr::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_reader(path.display().to_string(), file)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn index_of(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| MlErr::MissingColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    /// Returns every cell of `column`, in row order.
    pub fn column(&self, column: &str) -> Result<Vec<&str>> {
        let idx = self.index_of(column)?;
        Ok(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    /// Inner joins `self` with `other` on `key`, keeping the row order of `self`.
    ///
    /// The result holds the columns of `self` followed by the columns of `other` except `key`.
    /// A column present in both sides is renamed with an `_x` suffix on the left and a `_y`
    /// suffix on the right.
    ///
    /// # Errors
    /// If either side lacks `key`, or if `other` repeats a key.
    pub fn merge(&self, other: &Table, key: &str) -> Result<Table> {
        let left_key = self.index_of(key)?;
        let right_key = other.index_of(key)?;

        let mut lookup = HashMap::with_capacity(other.rows.len());
        for (i, row) in other.rows.iter().enumerate() {
            if lookup.insert(row[right_key].as_str(), i).is_some() {
                return Err(MlErr::DuplicateKey {
                    table: other.name.clone(),
                    key: row[right_key].clone(),
                });
            }
        }

        let shared = |c: &String| c != key && self.columns.contains(c) && other.columns.contains(c);

        let left_columns = self
            .columns
            .iter()
            .map(|c| if shared(c) { format!("{c}_x") } else { c.clone() });
        let right_columns = other
            .columns
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != right_key)
            .map(|(_, c)| if shared(c) { format!("{c}_y") } else { c.clone() });
        let columns = left_columns.chain(right_columns).collect();

        let rows = self
            .rows
            .iter()
            .filter_map(|row| {
                let matched = &other.rows[*lookup.get(row[left_key].as_str())?];
                let right = matched
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i != right_key)
                    .map(|(_, cell)| cell.clone());

                Some(row.iter().cloned().chain(right).collect())
            })
            .collect();

        Self::new(format!("{}+{}", self.name, other.name), columns, rows)
    }

    /// Stacks the rows of `other` below the rows of `self`.
    ///
    /// Both tables must have the same set of columns, the result follows the column order of `self`.
    pub fn concat(&self, other: &Table) -> Result<Table> {
        if self.columns.len() != other.columns.len() {
            return Err(MlErr::SizeMismatch {
                a: "left columns",
                b: "right columns",
                got: other.columns.len(),
                expected: self.columns.len(),
            });
        }

        let order = self
            .columns
            .iter()
            .map(|c| other.index_of(c))
            .collect::<Result<Vec<_>>>()?;

        let rows = self
            .rows
            .iter()
            .cloned()
            .chain(
                other
                    .rows
                    .iter()
                    .map(|row| order.iter().map(|&i| row[i].clone()).collect()),
            )
            .collect();

        Self::new(self.name.clone(), self.columns.clone(), rows)
    }

    /// Returns a copy of the table without `columns`.
    ///
    /// # Errors
    /// If any of `columns` is missing.
    pub fn drop(&self, columns: &[&str]) -> Result<Table> {
        let dropped = columns
            .iter()
            .map(|c| self.index_of(c))
            .collect::<Result<Vec<_>>>()?;

        let keep = |i: &usize| !dropped.contains(i);
        let kept: Vec<usize> = (0..self.columns.len()).filter(keep).collect();

        let project = |row: &Vec<String>| -> Vec<String> { kept.iter().map(|&i| row[i].clone()).collect() };
        Self::new(
            self.name.clone(),
            project(&self.columns),
            self.rows.iter().map(project).collect(),
        )
    }

    /// Parses `columns` as a `(rows, columns.len())` matrix of `f32`.
    ///
    /// # Errors
    /// If a column is missing or a cell isn't a number.
    pub fn to_matrix(&self, columns: &[&str]) -> Result<Array2<f32>> {
        let indices = columns
            .iter()
            .map(|c| self.index_of(c))
            .collect::<Result<Vec<_>>>()?;

        let mut data = Vec::with_capacity(self.rows.len() * indices.len());

        for (r, row) in self.rows.iter().enumerate() {
            for &i in &indices {
                let cell = &row[i];
                let value = cell.parse::<f32>().map_err(|_| MlErr::InvalidValue {
                    table: self.name.clone(),
                    row: r,
                    column: self.columns[i].clone(),
                    value: cell.clone(),
                })?;

                data.push(value);
            }
        }

        let shape = (self.rows.len(), indices.len());
        let got = data.len();

        Array2::from_shape_vec(shape, data).map_err(|_| MlErr::SizeMismatch {
            a: "cells",
            b: "matrix",
            got,
            expected: shape.0 * shape.1,
        })
    }
}
