//! Notes and validated note sets. A note set is immutable once built; its
//! order is part of the commitment.

use ethereum_types::U256;
use serde::{Deserialize, Serialize};

use crate::{
    error::ClaimError,
    types::{Address, MAX_NOTES},
};

/// A single transfer instruction. The label is carried for bookkeeping only
/// and never enters any derivation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub recipient: Address,
    pub amount: U256,
    #[serde(default)]
    pub label: String,
}

impl Note {
    pub fn new(recipient: Address, amount: U256) -> Self {
        Self {
            recipient,
            amount,
            label: String::new(),
        }
    }
}

/// Caller-supplied policy limits. The aggregate cap differs per deployment
/// and is never hardcoded.
#[derive(Clone, Copy, Debug)]
pub struct NotePolicy {
    pub max_total: U256,
}

/// An ordered, validated, non-empty sequence of at most [`MAX_NOTES`] notes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteSet(Vec<Note>);

impl NoteSet {
    /// Validates and seals a sequence of notes: non-empty, within capacity,
    /// strictly positive amounts, aggregate within the policy cap.
    pub fn new(notes: Vec<Note>, policy: &NotePolicy) -> Result<Self, ClaimError> {
        if notes.is_empty() {
            return Err(ClaimError::EmptyNoteSet);
        }
        if notes.len() > MAX_NOTES {
            return Err(ClaimError::TooManyNotes(notes.len()));
        }
        let mut total = U256::zero();
        for (i, note) in notes.iter().enumerate() {
            if note.amount.is_zero() {
                return Err(ClaimError::ZeroAmount(i));
            }
            total = total
                .checked_add(note.amount)
                .ok_or(ClaimError::AggregateTooLarge {
                    total: U256::max_value(),
                    max: policy.max_total,
                })?;
        }
        if total > policy.max_total {
            return Err(ClaimError::AggregateTooLarge {
                total,
                max: policy.max_total,
            });
        }
        Ok(Self(notes))
    }

    pub fn notes(&self) -> &[Note] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Note> {
        self.0.get(index)
    }

    /// Aggregate amount over all notes. Cannot overflow, validation summed
    /// with `checked_add` already.
    pub fn total(&self) -> U256 {
        self.0
            .iter()
            .fold(U256::zero(), |acc, n| acc + n.amount)
    }
}
