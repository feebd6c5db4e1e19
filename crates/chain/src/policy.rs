//! Transaction selection policies.
//!
//! A policy is a pure ordering over a list of pending transactions. The
//! mempool applies it to the whole pool on every change and again to each
//! extracted batch.

use powchain_core::Transaction;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing an unknown policy name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown selection policy '{0}' (expected greedy, altruistic, random or address:<addr>)")]
pub struct ParsePolicyError(String);

/// Which pending transactions are prioritized for the next block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Highest fee first.
    #[default]
    Greedy,
    /// Oldest first.
    Altruistic,
    /// Fresh uniform shuffle on every call.
    Random,
    /// Transactions paying `address` first.
    AddressPreference { address: String },
}

impl SelectionPolicy {
    /// Order `transactions` according to this policy.
    ///
    /// Greedy, Altruistic and AddressPreference are stable: ties keep their
    /// incoming relative order.
    pub fn order(&self, mut transactions: Vec<Transaction>) -> Vec<Transaction> {
        match self {
            SelectionPolicy::Greedy => {
                transactions.sort_by(|a, b| b.fee.cmp(&a.fee));
                transactions
            }
            SelectionPolicy::Altruistic => {
                transactions.sort_by_key(|tx| tx.timestamp);
                transactions
            }
            SelectionPolicy::Random => {
                transactions.shuffle(&mut rand::thread_rng());
                transactions
            }
            SelectionPolicy::AddressPreference { address } => {
                let (mut preferred, others): (Vec<_>, Vec<_>) = transactions
                    .into_iter()
                    .partition(|tx| tx.recipient == *address);
                preferred.extend(others);
                preferred
            }
        }
    }

    /// Short name used in logs and the CLI.
    pub fn name(&self) -> &'static str {
        match self {
            SelectionPolicy::Greedy => "greedy",
            SelectionPolicy::Altruistic => "altruistic",
            SelectionPolicy::Random => "random",
            SelectionPolicy::AddressPreference { .. } => "address",
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::AddressPreference { address } => write!(f, "address:{}", address),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "greedy" => Ok(SelectionPolicy::Greedy),
            "altruistic" => Ok(SelectionPolicy::Altruistic),
            "random" => Ok(SelectionPolicy::Random),
            _ => match s.split_once(':') {
                Some((kind, address)) if kind.eq_ignore_ascii_case("address") => {
                    Ok(SelectionPolicy::AddressPreference {
                        address: address.to_string(),
                    })
                }
                _ => Err(ParsePolicyError(s.to_string())),
            },
        }
    }
}
