//! Merge-node strategies and duplicate removal.
//!
//! A merge node receives one item list per incoming edge, in deterministic
//! source order. Inputs from inactive branches arrive as empty sequences.

use serde_json::{Map, Value};
use typeflow_model::{ExecutionItem, MergeConfig, MergeMode, RemoveDuplicatesConfig};

/// Apply a merge strategy to the per-edge inputs.
pub fn merge_items(config: &MergeConfig, inputs: &[Vec<ExecutionItem>]) -> Vec<ExecutionItem> {
  match config.mode {
    MergeMode::Append => inputs.iter().flatten().cloned().collect(),
    MergeMode::MergeByPosition => merge_by_position(inputs),
    MergeMode::MergeByKey => merge_by_key(inputs, config.key.as_deref().unwrap_or("id")),
    MergeMode::Multiplex => multiplex(inputs),
    MergeMode::ChooseBranch => inputs
      .iter()
      .find(|items| !items.is_empty())
      .cloned()
      .unwrap_or_default(),
  }
}

/// Zip by index over the longest input; missing positions contribute
/// nothing, so rows past a shorter (or inactive, hence empty) input carry
/// only the longer side's fields.
fn merge_by_position(inputs: &[Vec<ExecutionItem>]) -> Vec<ExecutionItem> {
  let longest = inputs.iter().map(|items| items.len()).max().unwrap_or(0);
  (0..longest)
    .map(|index| {
      let mut json = Map::new();
      for items in inputs {
        if let Some(item) = items.get(index) {
          for (key, value) in &item.json {
            json.insert(key.clone(), value.clone());
          }
        }
      }
      ExecutionItem {
        json,
        binary: None,
        paired_item: Some(index),
      }
    })
    .collect()
}

/// Outer join on a named field. Items sharing a key value merge into one;
/// keyless items pass through unchanged.
fn merge_by_key(inputs: &[Vec<ExecutionItem>], key: &str) -> Vec<ExecutionItem> {
  let mut order: Vec<String> = Vec::new();
  let mut merged: std::collections::HashMap<String, Map<String, Value>> =
    std::collections::HashMap::new();
  let mut keyless: Vec<ExecutionItem> = Vec::new();

  for items in inputs {
    for item in items {
      let Some(key_value) = item.field(key) else {
        keyless.push(item.clone());
        continue;
      };
      let key_repr = key_value.to_string();
      let entry = merged.entry(key_repr.clone()).or_insert_with(|| {
        order.push(key_repr);
        Map::new()
      });
      for (field, value) in &item.json {
        entry.insert(field.clone(), value.clone());
      }
    }
  }

  let mut out: Vec<ExecutionItem> = order
    .into_iter()
    .filter_map(|key_repr| merged.remove(&key_repr))
    .map(|json| ExecutionItem {
      json,
      binary: None,
      paired_item: None,
    })
    .collect();
  out.extend(keyless);
  out
}

/// Cartesian product of all inputs, merging field maps.
fn multiplex(inputs: &[Vec<ExecutionItem>]) -> Vec<ExecutionItem> {
  let non_empty: Vec<&Vec<ExecutionItem>> =
    inputs.iter().filter(|items| !items.is_empty()).collect();
  if non_empty.is_empty() {
    return Vec::new();
  }

  let mut combos: Vec<Map<String, Value>> = vec![Map::new()];
  for items in non_empty {
    let mut next = Vec::with_capacity(combos.len() * items.len());
    for combo in &combos {
      for item in items {
        let mut json = combo.clone();
        for (key, value) in &item.json {
          json.insert(key.clone(), value.clone());
        }
        next.push(json);
      }
    }
    combos = next;
  }

  combos
    .into_iter()
    .map(|json| ExecutionItem {
      json,
      binary: None,
      paired_item: None,
    })
    .collect()
}

/// Drop duplicate items, keeping first occurrences.
///
/// With a configured field, equality is on that dot-path's value; items
/// missing the field are kept. Otherwise whole-object equality applies.
pub fn remove_duplicates(
  config: &RemoveDuplicatesConfig,
  items: &[ExecutionItem],
) -> Vec<ExecutionItem> {
  let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
  let mut out = Vec::with_capacity(items.len());

  for item in items {
    let fingerprint = match &config.field {
      Some(field) => match item.field(field) {
        Some(value) => value.to_string(),
        None => {
          out.push(item.clone());
          continue;
        }
      },
      None => Value::Object(item.json.clone()).to_string(),
    };
    if seen.insert(fingerprint) {
      out.push(item.clone());
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn items(values: Vec<Value>) -> Vec<ExecutionItem> {
    values.into_iter().map(ExecutionItem::from_json).collect()
  }

  #[test]
  fn append_preserves_source_order() {
    let config = MergeConfig {
      mode: MergeMode::Append,
      key: None,
    };
    let merged = merge_items(
      &config,
      &[
        items(vec![json!({"k": 1})]),
        items(vec![json!({"k": 2}), json!({"k": 3})]),
      ],
    );
    let ks: Vec<_> = merged.iter().map(|i| i.json["k"].clone()).collect();
    assert_eq!(ks, vec![json!(1), json!(2), json!(3)]);
  }

  #[test]
  fn by_position_zips_and_pads_nothing() {
    let config = MergeConfig {
      mode: MergeMode::MergeByPosition,
      key: None,
    };
    let merged = merge_items(
      &config,
      &[
        items(vec![json!({"a": 1}), json!({"a": 2})]),
        items(vec![json!({"b": 10})]),
      ],
    );
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].json.get("a"), Some(&json!(1)));
    assert_eq!(merged[0].json.get("b"), Some(&json!(10)));
    assert_eq!(merged[1].json.get("a"), Some(&json!(2)));
    assert_eq!(merged[1].json.get("b"), None);
  }

  #[test]
  fn by_position_with_an_empty_input_keeps_the_other_side() {
    // An inactive branch contributes an empty sequence; the zip must not
    // invent fields for it.
    let config = MergeConfig {
      mode: MergeMode::MergeByPosition,
      key: None,
    };
    let merged = merge_items(&config, &[items(vec![]), items(vec![json!({"b": 1})])]);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].json.get("b"), Some(&json!(1)));
  }

  #[test]
  fn by_key_outer_joins() {
    let config = MergeConfig {
      mode: MergeMode::MergeByKey,
      key: Some("id".to_string()),
    };
    let merged = merge_items(
      &config,
      &[
        items(vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})]),
        items(vec![json!({"id": 1, "age": 30}), json!({"id": 3, "age": 9})]),
      ],
    );
    assert_eq!(merged.len(), 3);
    assert_eq!(merged[0].json.get("name"), Some(&json!("a")));
    assert_eq!(merged[0].json.get("age"), Some(&json!(30)));
    assert_eq!(merged[2].json.get("id"), Some(&json!(3)));
  }

  #[test]
  fn multiplex_is_a_cartesian_product() {
    let config = MergeConfig {
      mode: MergeMode::Multiplex,
      key: None,
    };
    let merged = merge_items(
      &config,
      &[
        items(vec![json!({"a": 1}), json!({"a": 2})]),
        items(vec![json!({"b": 1}), json!({"b": 2})]),
      ],
    );
    assert_eq!(merged.len(), 4);
    assert_eq!(merged[1].json.get("a"), Some(&json!(1)));
    assert_eq!(merged[1].json.get("b"), Some(&json!(2)));
  }

  #[test]
  fn choose_branch_takes_first_non_empty() {
    let config = MergeConfig {
      mode: MergeMode::ChooseBranch,
      key: None,
    };
    let merged = merge_items(
      &config,
      &[items(vec![]), items(vec![json!({"winner": true})])],
    );
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].json.get("winner"), Some(&json!(true)));
  }

  #[test]
  fn dedupe_by_field() {
    let config = RemoveDuplicatesConfig {
      field: Some("user.id".to_string()),
    };
    let out = remove_duplicates(
      &config,
      &items(vec![
        json!({"user": {"id": 1}, "seq": 1}),
        json!({"user": {"id": 1}, "seq": 2}),
        json!({"user": {"id": 2}, "seq": 3}),
        json!({"other": true}),
      ]),
    );
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].json.get("seq"), Some(&json!(1)));
  }

  #[test]
  fn dedupe_whole_object() {
    let config = RemoveDuplicatesConfig { field: None };
    let out = remove_duplicates(
      &config,
      &items(vec![json!({"a": 1}), json!({"a": 1}), json!({"a": 2})]),
    );
    assert_eq!(out.len(), 2);
  }
}
