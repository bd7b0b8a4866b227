use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::CollidbError;

/// Filter keywords the CollisionDB query endpoint accepts.
pub const VALID_QUERY_KEYWORDS: [&str; 14] = [
    "pk",
    "pks",
    "reaction_text",
    "reaction_texts",
    "reactant1",
    "reactant2",
    "product1",
    "product2",
    "process_types",
    "method",
    "data_type",
    "reactants",
    "products",
    "doi",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Int(i64),
    Text(String),
    IntList(Vec<i64>),
    TextList(Vec<String>),
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Int(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl From<Vec<i64>> for QueryValue {
    fn from(value: Vec<i64>) -> Self {
        QueryValue::IntList(value)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(value: Vec<String>) -> Self {
        QueryValue::TextList(value)
    }
}

impl From<Vec<&str>> for QueryValue {
    fn from(value: Vec<&str>) -> Self {
        QueryValue::TextList(value.into_iter().map(str::to_string).collect())
    }
}

/// A query under construction. Keywords are collected as-is and only
/// checked when [`Query::build`] turns them into a [`QueryPayload`].
#[derive(Debug, Clone, Default)]
pub struct Query {
    fields: BTreeMap<String, QueryValue>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, keyword: &str, value: impl Into<QueryValue>) -> Self {
        self.fields.insert(keyword.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, keyword: &str, value: impl Into<QueryValue>) {
        self.fields.insert(keyword.to_string(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Validates the collected keywords and normalizes them into the
    /// positional form the remote service filters on: `pk` becomes a
    /// one-element `pks` list, `reaction_text` a one-element
    /// `reaction_texts` list, and `reactants`/`products` expand into
    /// their numbered slots. A missing second species always becomes an
    /// empty-string wildcard, never an omitted key.
    pub fn build(mut self) -> Result<QueryPayload, CollidbError> {
        validate_keywords(self.fields.keys().map(String::as_str))?;

        if let Some(value) = self.fields.remove("pk") {
            let QueryValue::Int(pk) = value else {
                return Err(CollidbError::Keyword(
                    "pk must be a single integer".to_string(),
                ));
            };
            self.fields
                .insert("pks".to_string(), QueryValue::IntList(vec![pk]));
        }

        if let Some(value) = self.fields.remove("reaction_text") {
            let QueryValue::Text(text) = value else {
                return Err(CollidbError::Keyword(
                    "reaction_text must be a single string".to_string(),
                ));
            };
            self.fields
                .insert("reaction_texts".to_string(), QueryValue::TextList(vec![text]));
        }

        expand_species_pair(&mut self.fields, "reactants", "reactant1", "reactant2")?;
        expand_species_pair(&mut self.fields, "products", "product1", "product2")?;

        Ok(QueryPayload {
            fields: self.fields,
        })
    }
}

fn expand_species_pair(
    fields: &mut BTreeMap<String, QueryValue>,
    keyword: &str,
    first_slot: &str,
    second_slot: &str,
) -> Result<(), CollidbError> {
    let Some(value) = fields.remove(keyword) else {
        return Ok(());
    };
    let species = match value {
        QueryValue::TextList(list) => list,
        QueryValue::Text(single) => vec![single],
        _ => {
            return Err(CollidbError::Keyword(format!(
                "{keyword} must be a list of species identifiers"
            )));
        }
    };
    if species.len() > 2 {
        return Err(CollidbError::Keyword(format!(
            "a maximum of two species can be specified in {keyword}"
        )));
    }
    let mut species = species.into_iter();
    let first = species.next().ok_or_else(|| {
        CollidbError::Keyword(format!("{keyword} must name at least one species"))
    })?;
    let second = species.next().unwrap_or_default();
    fields.insert(first_slot.to_string(), QueryValue::Text(first));
    fields.insert(second_slot.to_string(), QueryValue::Text(second));
    Ok(())
}

/// Rejects unknown keywords and mutually-exclusive combinations.
pub fn validate_keywords<'a, I>(keywords: I) -> Result<(), CollidbError>
where
    I: IntoIterator<Item = &'a str>,
{
    let keywords: Vec<&str> = keywords.into_iter().collect();
    let has = |keyword: &str| keywords.contains(&keyword);

    for keyword in &keywords {
        if !VALID_QUERY_KEYWORDS.contains(keyword) {
            return Err(CollidbError::Keyword(format!(
                "unrecognized keyword {keyword}"
            )));
        }
    }

    if has("pk") && has("pks") {
        return Err(CollidbError::Keyword(
            "pk and pks cannot both be given".to_string(),
        ));
    }

    if has("reaction_text") && has("reaction_texts") {
        return Err(CollidbError::Keyword(
            "reaction_text and reaction_texts cannot both be given".to_string(),
        ));
    }

    if has("reactants") && (has("reactant1") || has("reactant2") || has("reaction_text")) {
        return Err(CollidbError::Keyword(
            "reactant1, reactant2 or reaction_text cannot be combined with reactants".to_string(),
        ));
    }

    if has("products") && (has("product1") || has("product2") || has("reaction_text")) {
        return Err(CollidbError::Keyword(
            "product1, product2 or reaction_text cannot be combined with products".to_string(),
        ));
    }

    Ok(())
}

/// The normalized filter structure sent to the query endpoint.
/// Immutable once built; key order is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPayload {
    #[serde(flatten)]
    fields: BTreeMap<String, QueryValue>,
}

impl QueryPayload {
    pub fn get(&self, keyword: &str) -> Option<&QueryValue> {
        self.fields.get(keyword)
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn to_json(&self) -> Result<String, CollidbError> {
        serde_json::to_string(&self.fields).map_err(|err| CollidbError::Http(err.to_string()))
    }
}
