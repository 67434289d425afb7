use chrono::{DateTime, SecondsFormat, Utc};

use crate::collection::Collection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Gte(String, String),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Gte(col, _) => col,
        }
    }

    fn to_param(&self) -> String {
        match self {
            Filter::Gte(col, v) => format!("{col}=gte.{}", urlencoding::encode(v)),
        }
    }
}

/// A PostgREST read: `collection?<filters>&order=..&limit=..`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    collection: Collection,
    filters: Vec<Filter>,
    order_desc: Option<String>,
    limit: Option<u32>,
}

impl Query {
    pub fn from(collection: Collection) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_desc: None,
            limit: None,
        }
    }

    pub fn gte(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter::Gte(column.to_string(), value.to_string()));
        self
    }

    /// Rows with `created_at >= since`.
    pub fn created_since(self, since: DateTime<Utc>) -> Self {
        self.gte("created_at", since.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order_desc = Some(column.to_string());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn order_column(&self) -> Option<&str> {
        self.order_desc.as_deref()
    }

    pub fn limit_value(&self) -> Option<u32> {
        self.limit
    }

    /// Path relative to `/rest/v1/`.
    pub fn to_path(&self) -> String {
        let mut params: Vec<String> = self.filters.iter().map(Filter::to_param).collect();
        if let Some(col) = &self.order_desc {
            params.push(format!("order={col}.desc"));
        }
        if let Some(limit) = self.limit {
            params.push(format!("limit={limit}"));
        }

        if params.is_empty() {
            self.collection.name().to_string()
        } else {
            format!("{}?{}", self.collection.name(), params.join("&"))
        }
    }
}
