use crate::calendar::{add_days, Calendar};
use jiff::civil::Date;
use jiff::Zoned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The three-dose course.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum Vaccine {
    A,
    B,
    C,
}

impl Vaccine {
    /// Dosing precedence. A later dose is never considered while an earlier
    /// one is outstanding.
    pub const ORDER: [Vaccine; 3] = [Vaccine::A, Vaccine::B, Vaccine::C];

    /// Day-offset window from date of birth within which this dose is
    /// expected. Program-wide constants, identical for every child.
    pub fn dose_window(self) -> DoseWindow {
        match self {
            Self::A => DoseWindow {
                start_days: 0,
                end_days: 7,
            },
            Self::B => DoseWindow {
                start_days: 42,
                end_days: 56,
            },
            Self::C => DoseWindow {
                start_days: 84,
                end_days: 98,
            },
        }
    }
}

impl fmt::Display for Vaccine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
        }
    }
}

/// Inclusive day-offset range relative to date of birth.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct DoseWindow {
    start_days: i16,
    end_days: i16,
}

impl DoseWindow {
    pub fn start_days(&self) -> i16 {
        self.start_days
    }

    pub fn end_days(&self) -> i16 {
        self.end_days
    }

    /// Concrete window for a child born on `dob`, inclusive on both ends.
    pub fn around(&self, dob: Date) -> DueWindow {
        DueWindow {
            start: add_days(dob, i64::from(self.start_days)),
            end: add_days(dob, i64::from(self.end_days)),
        }
    }
}

impl fmt::Display for DoseWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {} to {}", self.start_days, self.end_days)
    }
}

/// What a vaccination visit recorded. Only `A`, `B`, and `C` count as an
/// administered dose; the other two record the visit itself without one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum VisitOutcome {
    A,
    B,
    C,
    #[serde(rename = "none_required")]
    NoneRequired,
    #[serde(rename = "not_available")]
    NotAvailable,
}

impl VisitOutcome {
    /// The dose this visit administered, if any.
    pub fn administered(self) -> Option<Vaccine> {
        match self {
            Self::A => Some(Vaccine::A),
            Self::B => Some(Vaccine::B),
            Self::C => Some(Vaccine::C),
            Self::NoneRequired | Self::NotAvailable => None,
        }
    }
}

impl fmt::Display for VisitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
            Self::NoneRequired => write!(f, "none_required"),
            Self::NotAvailable => write!(f, "not_available"),
        }
    }
}

/// One recorded visit for a child. Callers pass visits already filtered to
/// a single child; ordering does not matter.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaccinationVisit {
    vaccine_given: VisitOutcome,
    visit_date: Zoned,
    #[serde(default)]
    notes: String,
}

impl VaccinationVisit {
    pub fn new(vaccine_given: VisitOutcome, visit_date: Zoned) -> Self {
        Self {
            vaccine_given,
            visit_date,
            notes: String::new(),
        }
    }

    pub fn vaccine_given(&self) -> VisitOutcome {
        self.vaccine_given
    }

    pub fn visit_date(&self) -> &Zoned {
        &self.visit_date
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn notes_mut(&mut self) -> &mut String {
        &mut self.notes
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DueStatus {
    Overdue,
    Due,
    Upcoming,
    Complete,
}

impl fmt::Display for DueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overdue => write!(f, "overdue"),
            Self::Due => write!(f, "due"),
            Self::Upcoming => write!(f, "upcoming"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Concrete due window for one child, inclusive on both ends.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct DueWindow {
    start: Date,
    end: Date,
}

impl DueWindow {
    pub fn start(&self) -> Date {
        self.start
    }

    pub fn end(&self) -> Date {
        self.end
    }
}

/// Where a child stands in the dose course. Recomputed on every query,
/// never persisted. `next_vaccine_due` and `due_window` are present exactly
/// when the course is not complete.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaccinationStatus {
    vaccines_given: BTreeSet<Vaccine>,
    next_vaccine_due: Option<Vaccine>,
    due_status: DueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    due_window: Option<DueWindow>,
}

impl VaccinationStatus {
    pub fn vaccines_given(&self) -> &BTreeSet<Vaccine> {
        &self.vaccines_given
    }

    pub fn next_vaccine_due(&self) -> Option<Vaccine> {
        self.next_vaccine_due
    }

    pub fn due_status(&self) -> DueStatus {
        self.due_status
    }

    pub fn due_window(&self) -> Option<&DueWindow> {
        self.due_window.as_ref()
    }
}

fn administered_doses(visits: &[VaccinationVisit]) -> BTreeSet<Vaccine> {
    visits
        .iter()
        .filter_map(|visit| visit.vaccine_given().administered())
        .collect()
}

// First vaccine in precedence order with no record at all. Presence is the
// only criterion: a child with a recorded B but no A is still waiting on A.
fn next_outstanding(given: &BTreeSet<Vaccine>) -> Option<Vaccine> {
    Vaccine::ORDER
        .into_iter()
        .find(|vaccine| !given.contains(vaccine))
}

/// Classify a child's standing in the dose course as of `now`.
///
/// Total over its inputs: any date of birth (including a future one) and
/// any visit collection (including an empty one) produce a consistent
/// answer. No side effects.
pub fn vaccination_status(
    dob: &Zoned,
    visits: &[VaccinationVisit],
    now: &Zoned,
    calendar: Calendar,
) -> VaccinationStatus {
    let dob = calendar.civil_date(dob);
    let today = calendar.civil_date(now);
    let given = administered_doses(visits);

    let Some(next) = next_outstanding(&given) else {
        return VaccinationStatus {
            vaccines_given: given,
            next_vaccine_due: None,
            due_status: DueStatus::Complete,
            due_window: None,
        };
    };

    let window = next.dose_window().around(dob);
    let due_status = if today > window.end() {
        DueStatus::Overdue
    } else if today >= window.start() {
        DueStatus::Due
    } else {
        DueStatus::Upcoming
    };

    VaccinationStatus {
        vaccines_given: given,
        next_vaccine_due: Some(next),
        due_status,
        due_window: Some(window),
    }
}

/// Which dose, if any, a child would need were a health worker to visit
/// during `[range_start, range_end]`.
///
/// Only the earliest outstanding dose can be the answer, since every later
/// window opens later still. That dose is wanted on the visit when its
/// window overlaps the range or closed before the range began; an overdue
/// dose is still given at the next opportunity. `range_start <= range_end`
/// is assumed, not validated.
pub fn vaccine_due_in_range(
    dob: &Zoned,
    visits: &[VaccinationVisit],
    range_start: &Zoned,
    range_end: &Zoned,
    calendar: Calendar,
) -> Option<Vaccine> {
    let dob = calendar.civil_date(dob);
    let start = calendar.civil_date(range_start);
    let end = calendar.civil_date(range_end);

    let next = next_outstanding(&administered_doses(visits))?;
    let window = next.dose_window().around(dob);
    let wanted = window.start() <= end || window.end() < start;
    wanted.then_some(next)
}
