//! Reshaping raw API payloads into reporting-friendly documents.

pub mod access;
pub mod activity;
pub mod artifacts;
pub mod cloud_connections;
pub mod dataflow_connections;
pub mod extraction;
pub mod inventory;
pub mod refreshes;

use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Count {
    pub name: String,
    pub count: usize,
}

/// Tally `keys`, most frequent first, ties by name. `limit` of `None` keeps all.
pub fn count_top<'a, I>(keys: I, limit: Option<usize>) -> Vec<Count>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }

    let mut sorted: Vec<Count> = counts
        .into_iter()
        .map(|(name, count)| Count {
            name: name.to_string(),
            count,
        })
        .collect();
    sorted.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

    if let Some(limit) = limit {
        sorted.truncate(limit);
    }
    sorted
}

fn csv_writer_to_string(wtr: csv::Writer<Vec<u8>>) -> Result<String, String> {
    let csv_bytes = wtr
        .into_inner()
        .map_err(|e| format!("Failed to get CSV bytes: {}", e))?;

    String::from_utf8(csv_bytes).map_err(|e| format!("Failed to convert CSV to string: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_sorted_by_frequency_then_name() {
        let counts = count_top(["b", "a", "b", "c", "a", "b"], None);
        assert_eq!(
            counts,
            vec![
                Count { name: "b".into(), count: 3 },
                Count { name: "a".into(), count: 2 },
                Count { name: "c".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn limit_truncates() {
        let counts = count_top(["x", "y", "y"], Some(1));
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].name, "y");
    }
}
