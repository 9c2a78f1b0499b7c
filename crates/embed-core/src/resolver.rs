#![forbid(unsafe_code)]

//! Impact statement resolution.
//!
//! Rules, in order:
//! 1. monthly cadence always produces the annualised monthly statement,
//!    whatever the catalog holds for the amount;
//! 2. a catalog hit renders that range's template;
//! 3. a miss above the catalog ceiling renders the high-value statement;
//! 4. any other miss renders the generic statement.
//!
//! Resolution never fails for a valid [`Amount`]. Remote lookups that fail
//! are logged and downgraded to rule 3/4.

use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Cadence};
use crate::catalog::StatementCatalog;
use crate::remote::{ImpactResponse, RemoteFailure};

const AMOUNT_PLACEHOLDER: &str = "{amount}";
const ANNUAL_PLACEHOLDER: &str = "{annual}";

/// Display text ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStatement {
    pub text: String,
    pub source_range_id: Option<u32>,
    pub is_fallback: bool,
}

/// Templates for statements not taken from the catalog.
///
/// `{amount}` is replaced with the literal amount, `{annual}` with twelve
/// times the amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementTemplates {
    pub monthly: String,
    pub high_value: String,
    pub generic: String,
}

impl Default for StatementTemplates {
    fn default() -> Self {
        Self {
            monthly: "£{amount} a month (£{annual} a year) could make a lasting difference to people affected by cancer throughout the year.".into(),
            high_value: "£{amount} will make a significant difference to people affected by cancer. Your generosity will help us be there for everyone who needs us.".into(),
            generic: "£{amount} will make a real difference to people affected by cancer. Thank you for your support.".into(),
        }
    }
}

impl StatementTemplates {
    /// Problems that would make a template render without the amount.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (name, template) in [
            ("monthly", &self.monthly),
            ("high_value", &self.high_value),
            ("generic", &self.generic),
        ] {
            if !template.contains(AMOUNT_PLACEHOLDER) {
                errors.push(format!("templates.{name} must contain {AMOUNT_PLACEHOLDER}"));
            }
        }
        if !self.monthly.contains(ANNUAL_PLACEHOLDER) {
            errors.push(format!("templates.monthly must contain {ANNUAL_PLACEHOLDER}"));
        }
        errors
    }
}

fn render(template: &str, amount: Amount) -> String {
    template
        .replace(AMOUNT_PLACEHOLDER, &amount.to_string())
        .replace(ANNUAL_PLACEHOLDER, &amount.annual().to_string())
}

/// Maps an amount and cadence to a [`ResolvedStatement`].
#[derive(Debug, Clone, Default)]
pub struct ImpactResolver {
    catalog: StatementCatalog,
    templates: StatementTemplates,
}

impl ImpactResolver {
    #[must_use]
    pub fn new(catalog: StatementCatalog) -> Self {
        Self {
            catalog,
            templates: StatementTemplates::default(),
        }
    }

    #[must_use]
    pub fn with_templates(mut self, templates: StatementTemplates) -> Self {
        self.templates = templates;
        self
    }

    #[must_use]
    pub const fn catalog(&self) -> &StatementCatalog {
        &self.catalog
    }

    #[must_use]
    pub const fn templates(&self) -> &StatementTemplates {
        &self.templates
    }

    /// Resolve locally against the catalog.
    #[must_use]
    pub fn resolve(&self, amount: Amount, cadence: Cadence) -> ResolvedStatement {
        if cadence == Cadence::Monthly {
            return self.monthly(amount);
        }
        match self.catalog.lookup(amount) {
            Some(range) => {
                tracing::trace!(
                    target: "embed.resolver",
                    amount = amount.get(),
                    range_id = range.id,
                    "catalog hit"
                );
                ResolvedStatement {
                    text: render(&range.template, amount),
                    source_range_id: Some(range.id),
                    is_fallback: false,
                }
            }
            None => self.fallback(amount),
        }
    }

    /// Synthesised text for an amount with no usable range.
    #[must_use]
    pub fn fallback(&self, amount: Amount) -> ResolvedStatement {
        let above_ceiling = self
            .catalog
            .ceiling()
            .is_some_and(|ceiling| amount.get() > ceiling);
        let template = if above_ceiling {
            &self.templates.high_value
        } else {
            &self.templates.generic
        };
        tracing::debug!(
            target: "embed.resolver",
            amount = amount.get(),
            above_ceiling,
            "no catalog range; using fallback statement"
        );
        ResolvedStatement {
            text: render(template, amount),
            source_range_id: None,
            is_fallback: true,
        }
    }

    /// Interpret the outcome of a remote lookup.
    ///
    /// Monthly cadence still follows rule 1; failures fall back locally.
    #[must_use]
    pub fn settle_remote(
        &self,
        amount: Amount,
        cadence: Cadence,
        outcome: Result<ImpactResponse, RemoteFailure>,
    ) -> ResolvedStatement {
        if cadence == Cadence::Monthly {
            return self.monthly(amount);
        }
        match outcome {
            Ok(response) => ResolvedStatement {
                text: response.statement,
                source_range_id: response.config_id,
                is_fallback: response.is_custom,
            },
            Err(failure) => {
                tracing::warn!(
                    target: "embed.resolver",
                    amount = amount.get(),
                    error = %failure,
                    "remote statement lookup failed; using fallback"
                );
                self.fallback(amount)
            }
        }
    }

    fn monthly(&self, amount: Amount) -> ResolvedStatement {
        ResolvedStatement {
            text: render(&self.templates.monthly, amount),
            source_range_id: None,
            is_fallback: false,
        }
    }
}
