use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Entity, EntityKind};
use crate::sync::fingerprint;

/// An upcoming collectible mint the user wants to be reminded about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mint {
    pub name: String,
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub mint_date: Option<NaiveDate>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub supply: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub notes: String,
}

impl Mint {
    pub fn new(name: impl Into<String>, chain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: chain.into(),
            mint_date: None,
            price: None,
            supply: None,
            link: None,
            notes: String::new(),
        }
    }

    pub fn with_mint_date(mut self, date: NaiveDate) -> Self {
        self.mint_date = Some(date);
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_supply(mut self, supply: u32) -> Self {
        self.supply = Some(supply);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

impl Entity for Mint {
    const KIND: EntityKind = EntityKind::Mint;

    fn fingerprint(&self) -> String {
        fingerprint::digest(&[
            fingerprint::text(&self.name),
            fingerprint::text(&self.chain),
            fingerprint::date(self.mint_date),
            fingerprint::number(self.price),
            fingerprint::number(self.supply),
        ])
    }
}

impl fmt::Display for Mint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "=".repeat(self.name.len()))?;
        if !self.chain.is_empty() {
            writeln!(f, "Chain: {}", self.chain)?;
        }
        if let Some(date) = self.mint_date {
            writeln!(f, "Date: {}", date)?;
        }
        if let Some(price) = self.price {
            writeln!(f, "Price: {}", price)?;
        }
        if let Some(supply) = self.supply {
            writeln!(f, "Supply: {}", supply)?;
        }
        if let Some(link) = &self.link {
            writeln!(f, "Link: {}", link)?;
        }
        if !self.notes.is_empty() {
            writeln!(f, "\n{}", self.notes)?;
        }
        Ok(())
    }
}
