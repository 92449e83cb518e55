use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How many entries each "top" list of [`Statistics`] holds.
pub const TOP_N: usize = 10;

/// One value of a ranking and how often it was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopEntry {
    pub value: String,
    pub count: u64,
}

/// Aggregate view over everything stored.
///
/// Attacker IPs are ranked over generic network events, the other lists over
/// their own tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_events: u64,
    pub total_auth_attempts: u64,
    pub total_commands: u64,
    pub total_sessions: u64,
    pub top_passwords: Vec<TopEntry>,
    pub top_usernames: Vec<TopEntry>,
    pub top_commands: Vec<TopEntry>,
    pub top_attacker_ips: Vec<TopEntry>,
}

/// Counts `values` and keeps the [`TOP_N`] most frequent, ties broken by value.
pub fn rank<I>(values: I) -> Vec<TopEntry>
where
    I: IntoIterator<Item = String>,
{
    let mut counts: HashMap<String, u64> = HashMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }

    let mut ranked: Vec<TopEntry> = counts
        .into_iter()
        .map(|(value, count)| TopEntry { value, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    ranked.truncate(TOP_N);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_orders_by_count_then_value() {
        let values = ["123456", "admin", "123456", "root", "admin", "123456"]
            .iter()
            .map(|s| s.to_string());

        assert_eq!(
            rank(values),
            vec![
                TopEntry { value: "123456".into(), count: 3 },
                TopEntry { value: "admin".into(), count: 2 },
                TopEntry { value: "root".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_rank_keeps_top_n() {
        let values = (0..25).map(|n| format!("pw{:02}", n));
        assert_eq!(rank(values).len(), TOP_N);
    }
}
