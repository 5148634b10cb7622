//! Session state and the single reducer every mutation goes through.

use time::OffsetDateTime;
use tracing::{debug, info};

use crate::day_key::DayKey;
use crate::goals::model::{Draft, GoalPatch, GoalProfile};
use crate::goals::services::{recommend_budget, Recommendation};
use crate::ledger::repo::{Ledger, LedgerError};
use crate::ledger::repo_types::{DayRecord, EntryId, EntryPatch, FoodEntry, MealSlot, NewEntry};

/// Everything the user owns: the ledger, the active goal profile and its draft.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracker {
    pub ledger: Ledger,
    pub goal: GoalProfile,
    pub draft: Draft<GoalProfile>,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(Ledger::new(), GoalProfile::default())
    }
}

impl Tracker {
    pub fn new(ledger: Ledger, goal: GoalProfile) -> Self {
        let draft = Draft::of(&goal);
        Self {
            ledger,
            goal,
            draft,
        }
    }

    /// Runs `action` through [`reduce`] in place.
    pub fn dispatch(&mut self, action: Action, clock: &Clock) -> Outcome {
        self.apply(|state| reduce(state, action, clock))
    }

    /// Steps a copy and swaps it in only once `step` returns, so a panic
    /// mid-step leaves `self` as it was.
    fn apply(&mut self, step: impl FnOnce(Tracker) -> (Tracker, Outcome)) -> Outcome {
        let (next, outcome) = step(self.clone());
        *self = next;
        outcome
    }

    /// Draft differs from the active profile.
    pub fn draft_dirty(&self) -> bool {
        self.draft.get() != &self.goal
    }
}

/// "Now", as seen by the reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    pub today: DayKey,
    pub now_ms: i64,
}

impl Clock {
    pub fn system() -> Self {
        Self::at(OffsetDateTime::now_utc())
    }

    pub fn at(now: OffsetDateTime) -> Self {
        Self {
            today: DayKey::from_timestamp(now),
            now_ms: (now.unix_timestamp_nanos() / 1_000_000) as i64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    AddEntries {
        day: DayKey,
        slot: MealSlot,
        entries: Vec<NewEntry>,
    },
    UpdateEntry {
        day: DayKey,
        slot: MealSlot,
        id: EntryId,
        patch: EntryPatch,
    },
    RemoveEntry {
        day: DayKey,
        slot: MealSlot,
        id: EntryId,
    },
    SetWater {
        day: DayKey,
        count: u32,
    },
    SetWeight {
        day: DayKey,
        weight: f64,
    },
    ClearWeight {
        day: DayKey,
    },
    EditDraft(GoalPatch),
    RecalculateDraft,
    CommitDraft,
    DiscardDraft,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    EntriesAdded(Vec<FoodEntry>),
    EntryUpdated(FoodEntry),
    EntryRemoved(FoodEntry),
    DayUpdated(DayRecord),
    DraftUpdated(Option<Recommendation>),
    GoalCommitted,
    /// Nothing changed. The state returned alongside is the input state.
    Unchanged(LedgerError),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        !matches!(self, Outcome::Unchanged(_))
    }
}

/// `(state, action) -> (state', outcome)`.
pub fn reduce(mut state: Tracker, action: Action, clock: &Clock) -> (Tracker, Outcome) {
    let outcome = match action {
        Action::AddEntries { day, slot, entries } => {
            match state.ledger.add_entries(day, slot, entries, clock.now_ms) {
                Ok(added) => Outcome::EntriesAdded(added),
                Err(e) => Outcome::Unchanged(e),
            }
        }
        Action::UpdateEntry {
            day,
            slot,
            id,
            patch,
        } => match state.ledger.update_entry(day, slot, &id, &patch) {
            Ok(entry) => Outcome::EntryUpdated(entry),
            Err(e) => Outcome::Unchanged(e),
        },
        Action::RemoveEntry { day, slot, id } => match state.ledger.remove_entry(day, slot, &id) {
            Some(entry) => Outcome::EntryRemoved(entry),
            None => Outcome::Unchanged(LedgerError::EntryNotFound { day, slot, id }),
        },
        Action::SetWater { day, count } => Outcome::DayUpdated(state.ledger.set_water(day, count)),
        Action::SetWeight { day, weight } => {
            let record = state.ledger.set_weight(day, Some(weight));
            // only today's sample is "the latest weight"
            if day == clock.today {
                state.goal.current_weight = weight;
                state.draft.set_current_weight(weight);
                debug!(%day, weight, "current weight synced from today's sample");
            }
            Outcome::DayUpdated(record)
        }
        Action::ClearWeight { day } => Outcome::DayUpdated(state.ledger.set_weight(day, None)),
        Action::EditDraft(patch) => {
            state.draft.edit(&patch);
            Outcome::DraftUpdated(None)
        }
        Action::RecalculateDraft => {
            let rec = recommend_budget(&state.draft);
            state
                .draft
                .set_budget(rec.daily_calorie_budget, rec.nutrient_goals);
            Outcome::DraftUpdated(Some(rec))
        }
        Action::CommitDraft => {
            state.goal = state.draft.commit();
            info!(
                budget = state.goal.daily_calorie_budget,
                "goal profile committed"
            );
            Outcome::GoalCommitted
        }
        Action::DiscardDraft => {
            state.draft = Draft::of(&state.goal);
            Outcome::DraftUpdated(None)
        }
    };
    (state, outcome)
}
