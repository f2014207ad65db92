/*
 * PanSim
 * Copyright (c) 2020  ThoughtWorks, Inc.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 */

use std::path::Path;

use crate::error::{Error, Result};
use crate::models::custom_types::Count;

/// Per-tick histogram of persons in each disease state, written as CSV at
/// the end of the run (one row per completed tick, one column per state).
#[derive(Debug, Clone)]
pub struct Epicurve {
    states: Vec<String>,
    rows: Vec<Vec<Count>>,
}

impl Epicurve {
    pub fn new(states: Vec<String>) -> Epicurve {
        Epicurve { states, rows: Vec::new() }
    }

    pub fn push_row(&mut self, row: Vec<Count>) -> Result<()> {
        if row.len() != self.states.len() {
            return Err(Error::InvalidInput(format!(
                "epicurve row has {} cells, expected {}",
                row.len(),
                self.states.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn rows(&self) -> &[Vec<Count>] {
        &self.rows
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.states)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(Count::to_string))?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn writes_states_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("epicurve.csv");

        let mut epicurve =
            Epicurve::new(vec!["S".to_string(), "E".to_string(), "I".to_string()]);
        epicurve.push_row(vec![8, 1, 0]).unwrap();
        epicurve.push_row(vec![7, 1, 1]).unwrap();
        epicurve.write(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "S,E,I\n8,1,0\n7,1,1\n");
    }

    #[test]
    fn rejects_short_row() {
        let mut epicurve = Epicurve::new(vec!["S".to_string(), "E".to_string()]);
        assert!(matches!(epicurve.push_row(vec![1]), Err(Error::InvalidInput(_))));
    }
}
