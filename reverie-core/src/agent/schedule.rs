//! Daily schedule arithmetic.
//!
//! A schedule is an ordered list of `(activity, minutes)` slots that sums
//! to a full day. Slots are refined in place by sum-preserving splices and
//! reaction windows are rewritten without changing the window total.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Minutes in a day.
pub const DAY_MINUTES: u32 = 1440;

/// Activity used to pad an incomplete day.
pub const SLEEPING: &str = "sleeping";

/// One schedule slot, serialized as `[activity, minutes]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleEntry(pub String, pub u32);

impl ScheduleEntry {
    /// Build a slot.
    #[must_use]
    pub fn new(activity: impl Into<String>, minutes: u32) -> Self {
        Self(activity.into(), minutes)
    }

    /// Activity text.
    #[must_use]
    pub fn activity(&self) -> &str {
        &self.0
    }

    /// Duration in minutes.
    #[must_use]
    pub fn duration(&self) -> u32 {
        self.1
    }
}

/// Sum of all slot durations.
#[must_use]
pub fn total_minutes(schedule: &[ScheduleEntry]) -> u32 {
    schedule.iter().map(ScheduleEntry::duration).sum()
}

/// Index of the slot covering `minute` of the day.
///
/// Durations are accumulated until the running sum exceeds `minute`. A
/// minute past the end of the schedule yields `schedule.len()`.
#[must_use]
pub fn schedule_index(schedule: &[ScheduleEntry], minute: u32) -> usize {
    let mut elapsed = 0;
    for (i, slot) in schedule.iter().enumerate() {
        elapsed += slot.duration();
        if elapsed > minute {
            return i;
        }
    }
    schedule.len()
}

/// Minute of day at which slot `index` starts.
#[must_use]
pub fn slot_start(schedule: &[ScheduleEntry], index: usize) -> u32 {
    total_minutes(&schedule[..index.min(schedule.len())])
}

/// Merge consecutive identical hourly activities into one slot each.
#[must_use]
pub fn compress_hourly(activities: &[String]) -> Vec<ScheduleEntry> {
    let mut out: Vec<ScheduleEntry> = Vec::new();
    for activity in activities {
        match out.last_mut() {
            Some(last) if last.0 == *activity => last.1 += 60,
            _ => out.push(ScheduleEntry::new(activity.clone(), 60)),
        }
    }
    out
}

/// Whether a slot should be broken into finer steps.
///
/// Sleep is never decomposed; short bed-related slots still are.
#[must_use]
pub fn needs_decomposition(activity: &str, minutes: u32) -> bool {
    if !activity.contains("sleep") && !activity.contains("bed") {
        return true;
    }
    if activity.contains("sleeping") || activity.contains("asleep") || activity.contains("in bed") {
        return false;
    }
    minutes <= 60
}

/// Force `parts` to sum to exactly `target` minutes.
///
/// Zero-length parts are dropped, excess is cut from the tail and any
/// shortfall extends the last part. An empty result becomes one slot of
/// `fallback`.
#[must_use]
pub fn fit_to_duration(parts: Vec<ScheduleEntry>, target: u32, fallback: &str) -> Vec<ScheduleEntry> {
    let mut out = Vec::with_capacity(parts.len());
    let mut used = 0;
    for part in parts.into_iter().filter(|p| p.duration() > 0) {
        if used >= target {
            break;
        }
        let minutes = part.duration().min(target - used);
        used += minutes;
        out.push(ScheduleEntry(part.0, minutes));
    }
    if out.is_empty() {
        if target > 0 {
            out.push(ScheduleEntry::new(fallback, target));
        }
    } else if used < target
        && let Some(last) = out.last_mut()
    {
        last.1 += target - used;
    }
    out
}

/// Replace slot `index` with `parts`, preserving the slot's duration.
///
/// Parts that do not sum to the slot duration are fitted first; the
/// mismatch is logged. Returns the number of slots inserted.
pub fn splice_decomposition(schedule: &mut Vec<ScheduleEntry>, index: usize, parts: Vec<ScheduleEntry>) -> usize {
    let Some(slot) = schedule.get(index).cloned() else {
        return 0;
    };
    let given = total_minutes(&parts);
    if given != slot.duration() {
        warn!(
            activity = slot.activity(),
            expected = slot.duration(),
            given,
            "Decomposition does not sum to its slot; fitting"
        );
    }
    let parts = fit_to_duration(parts, slot.duration(), slot.activity());
    debug_assert_eq!(total_minutes(&parts), slot.duration());
    let n = parts.len();
    schedule.splice(index..=index, parts);
    n
}

/// Bring a schedule to exactly one day.
///
/// A short day is padded with a trailing sleeping slot; an overlong one is
/// cut back.
pub fn top_up_day(schedule: &mut Vec<ScheduleEntry>) {
    let total = total_minutes(schedule);
    if total < DAY_MINUTES {
        schedule.push(ScheduleEntry::new(SLEEPING, DAY_MINUTES - total));
    } else if total > DAY_MINUTES {
        warn!(total, "Schedule exceeds one day; truncating");
        let fitted = fit_to_duration(std::mem::take(schedule), DAY_MINUTES, SLEEPING);
        *schedule = fitted;
    }
}

// ---------------------------------------------------------------------------
// Reaction windows
// ---------------------------------------------------------------------------

/// The stretch of the day a reaction is allowed to rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionWindow {
    /// First hour of the window.
    pub start_hour: u32,
    /// Hour the window ends.
    pub end_hour: u32,
}

impl ReactionWindow {
    /// Window around `minute`, taken from the frozen hourly plan.
    ///
    /// A slot of two hours or more is its own window; a shorter slot is
    /// joined with the next one; with no next slot the window is two hours.
    #[must_use]
    pub fn around(hourly_org: &[ScheduleEntry], minute: u32) -> Self {
        let index = schedule_index(hourly_org, minute);
        let start_hour = slot_start(hourly_org, index) / 60;
        let span = match (hourly_org.get(index), hourly_org.get(index + 1)) {
            (Some(cur), _) if cur.duration() >= 120 => cur.duration(),
            (Some(cur), Some(next)) if cur.duration() + next.duration() > 0 => {
                cur.duration() + next.duration()
            }
            _ => 120,
        };
        let end_hour = (start_hour + span / 60).min(24);
        Self { start_hour, end_hour }
    }

    /// Slot index range `[start, end)` of `schedule` inside the window.
    ///
    /// `start` is the first slot beginning at or after the window start,
    /// `end` the first beginning at or after the window end.
    #[must_use]
    pub fn indices(self, schedule: &[ScheduleEntry]) -> (usize, usize) {
        let mut start = None;
        let mut end = None;
        let mut elapsed = 0;
        for (i, slot) in schedule.iter().enumerate() {
            if start.is_none() && elapsed >= self.start_hour * 60 {
                start = Some(i);
            }
            if end.is_none() && elapsed >= self.end_hour * 60 {
                end = Some(i);
            }
            elapsed += slot.duration();
        }
        let start = start.unwrap_or(schedule.len());
        let end = end.unwrap_or(schedule.len()).max(start);
        (start, end)
    }
}

/// The inputs for rewriting one window around an inserted activity.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPlan {
    /// The window.
    pub window: ReactionWindow,
    /// Slots currently inside the window.
    pub main: Vec<ScheduleEntry>,
    /// The part of the window already lived, cut at the current minute.
    pub truncated: Vec<ScheduleEntry>,
    /// The new activity.
    pub inserted: ScheduleEntry,
    /// Deterministic rewrite: truncated, inserted, then the rest of the
    /// original timeline.
    pub proposal: Vec<ScheduleEntry>,
    start_index: usize,
    end_index: usize,
}

impl WindowPlan {
    /// Plan the insertion of `inserted` at `minute` into `schedule`.
    #[must_use]
    pub fn new(
        schedule: &[ScheduleEntry],
        window: ReactionWindow,
        minute: u32,
        inserted: ScheduleEntry,
    ) -> Self {
        let (start_index, end_index) = window.indices(schedule);
        let main = schedule[start_index..end_index].to_vec();
        let w0 = slot_start(schedule, start_index);
        let w1 = w0 + total_minutes(&main);
        let now = minute.clamp(w0, w1);

        let truncated = slice_timeline(&main, w0, w0, now);
        let inserted_len = inserted.duration().min(w1 - now);
        let mut proposal = truncated.clone();
        if inserted_len > 0 {
            proposal.push(ScheduleEntry(inserted.0.clone(), inserted_len));
        }
        proposal.extend(slice_timeline(&main, w0, now + inserted_len, w1));

        Self {
            window,
            main,
            truncated,
            inserted,
            proposal,
            start_index,
            end_index,
        }
    }

    /// Minutes covered by the window.
    #[must_use]
    pub fn total(&self) -> u32 {
        total_minutes(&self.main)
    }

    /// Whether `candidate` may replace the window.
    #[must_use]
    pub fn accepts(&self, candidate: &[ScheduleEntry]) -> bool {
        !candidate.is_empty()
            && total_minutes(candidate) == self.total()
            && candidate.starts_with(&self.truncated)
    }

    /// Write `rewrite` over the window, or the proposal if it is not
    /// acceptable.
    pub fn apply(&self, schedule: &mut Vec<ScheduleEntry>, rewrite: Option<Vec<ScheduleEntry>>) {
        let slots = match rewrite {
            Some(r) if self.accepts(&r) => r,
            Some(_) => {
                warn!(
                    window_start = self.window.start_hour,
                    window_end = self.window.end_hour,
                    "Window rewrite rejected; using deterministic splice"
                );
                self.proposal.clone()
            }
            None => self.proposal.clone(),
        };
        debug_assert_eq!(total_minutes(&slots), self.total());
        schedule.splice(self.start_index..self.end_index, slots);
    }
}

/// Parts of `slots` (laid out from minute `origin`) that fall in `[from, to)`.
fn slice_timeline(slots: &[ScheduleEntry], origin: u32, from: u32, to: u32) -> Vec<ScheduleEntry> {
    let mut out = Vec::new();
    let mut start = origin;
    for slot in slots {
        let end = start + slot.duration();
        let lo = start.max(from);
        let hi = end.min(to);
        if hi > lo {
            out.push(ScheduleEntry(slot.0.clone(), hi - lo));
        }
        start = end;
    }
    out
}
