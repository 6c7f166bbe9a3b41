//! Generated identifier names.

use crate::classify::snake_name;
use std::collections::HashSet;

/// Case-insensitive name allocator: repeated bases get `_2`, `_3`, ...
#[derive(Debug, Clone, Default)]
pub struct UniqueNames {
    used: HashSet<String>,
}

impl UniqueNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register names that must not be handed out again.
    pub fn reserve<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.used.insert(name.to_ascii_lowercase());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(&name.to_ascii_lowercase())
    }

    pub fn allocate(&mut self, base: &str) -> String {
        let base = if base.is_empty() { "_" } else { base };
        if self.used.insert(base.to_ascii_lowercase()) {
            return base.to_string();
        }
        let mut i = 2usize;
        loop {
            let candidate = format!("{base}_{i}");
            if self.used.insert(candidate.to_ascii_lowercase()) {
                return candidate;
            }
            i += 1;
        }
    }
}

pub fn fact_name(table: &str) -> String {
    format!("fact_{}", snake_name(table))
}

pub fn dimension_name(base: &str) -> String {
    format!("dim_{}", snake_name(base))
}

/// `dim_customers` -> `customers`.
pub fn dimension_base(name: &str) -> &str {
    name.strip_prefix("dim_").unwrap_or(name)
}

/// Fact key stem for a foreign-key column: `customer_id` -> `customer`.
pub fn key_stem(column: &str) -> String {
    let snake = snake_name(column);
    match snake.strip_suffix("_id") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => snake,
    }
}
