use crate::calendar::{trailing_months, Calendar, MonthWindow};
use crate::schedule::{vaccine_due_in_range, VaccinationVisit, Vaccine};
use itertools::Itertools;
use jiff::civil::Date;
use jiff::Zoned;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One child's date of birth and visit history. Callers pre-filter the set
/// of children a report runs over (per village, per cohort).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildHistory {
    date_of_birth: Zoned,
    visits: Vec<VaccinationVisit>,
}

impl ChildHistory {
    pub fn new(date_of_birth: Zoned, visits: Vec<VaccinationVisit>) -> Self {
        Self {
            date_of_birth,
            visits,
        }
    }

    pub fn date_of_birth(&self) -> &Zoned {
        &self.date_of_birth
    }

    pub fn visits(&self) -> &[VaccinationVisit] {
        &self.visits
    }

    // Administered doses whose visit day satisfies `keep`.
    fn doses_where(&self, calendar: Calendar, keep: impl Fn(Date) -> bool) -> BTreeSet<Vaccine> {
        self.visits
            .iter()
            .filter_map(|visit| {
                let vaccine = visit.vaccine_given().administered()?;
                keep(calendar.civil_date(visit.visit_date())).then_some(vaccine)
            })
            .collect()
    }
}

/// Dose tallies keyed the way the reporting API spells vaccines.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct DoseCounts {
    #[serde(rename = "A")]
    a: usize,
    #[serde(rename = "B")]
    b: usize,
    #[serde(rename = "C")]
    c: usize,
}

impl DoseCounts {
    pub fn get(&self, vaccine: Vaccine) -> usize {
        match vaccine {
            Vaccine::A => self.a,
            Vaccine::B => self.b,
            Vaccine::C => self.c,
        }
    }

    fn slot(&mut self, vaccine: Vaccine) -> &mut usize {
        match vaccine {
            Vaccine::A => &mut self.a,
            Vaccine::B => &mut self.b,
            Vaccine::C => &mut self.c,
        }
    }
}

/// Forecast of doses an outreach team should carry for a date range.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandReport {
    demand: DoseCounts,
    total_children: usize,
    children_needing_vaccines: usize,
}

impl DemandReport {
    pub fn demand(&self) -> &DoseCounts {
        &self.demand
    }

    pub fn total_children(&self) -> usize {
        self.total_children
    }

    pub fn children_needing_vaccines(&self) -> usize {
        self.children_needing_vaccines
    }
}

/// Count, per vaccine, the children whose next outstanding dose falls due
/// (or is already overdue) during `[range_start, range_end]`.
pub fn vaccine_demand(
    children: &[ChildHistory],
    range_start: &Zoned,
    range_end: &Zoned,
    calendar: Calendar,
) -> DemandReport {
    let needed = children
        .iter()
        .filter_map(|child| {
            vaccine_due_in_range(
                child.date_of_birth(),
                child.visits(),
                range_start,
                range_end,
                calendar,
            )
        })
        .collect_vec();
    let tally = needed.iter().copied().counts();

    let mut demand = DoseCounts::default();
    for vaccine in Vaccine::ORDER {
        *demand.slot(vaccine) = tally.get(&vaccine).copied().unwrap_or(0);
    }
    debug!(
        "demand over {} children: {} need a dose",
        children.len(),
        needed.len()
    );
    DemandReport {
        demand,
        total_children: children.len(),
        children_needing_vaccines: needed.len(),
    }
}

/// Course attrition: children who started the course (dose A) against those
/// who finished it (dose C).
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropoutStats {
    children_started: usize,
    children_completed: usize,
    dropout_rate: f64,
}

impl DropoutStats {
    pub fn children_started(&self) -> usize {
        self.children_started
    }

    pub fn children_completed(&self) -> usize {
        self.children_completed
    }

    pub fn dropout_rate(&self) -> f64 {
        self.dropout_rate
    }
}

/// Attrition over all visits on or before `through`.
pub fn dropout_stats(children: &[ChildHistory], through: Date, calendar: Calendar) -> DropoutStats {
    let mut started = 0usize;
    let mut completed = 0usize;
    for child in children {
        let given = child.doses_where(calendar, |day| day <= through);
        if given.contains(&Vaccine::A) {
            started += 1;
        }
        if given.contains(&Vaccine::C) {
            completed += 1;
        }
    }
    let dropout_rate = if started > 0 {
        round4((started as f64 - completed as f64) / started as f64)
    } else {
        0.0
    };
    DropoutStats {
        children_started: started,
        children_completed: completed,
        dropout_rate,
    }
}

/// Attrition as of one month's end.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MonthlyDropout {
    month: String,
    #[serde(flatten)]
    stats: DropoutStats,
}

impl MonthlyDropout {
    pub fn month(&self) -> &str {
        &self.month
    }

    pub fn stats(&self) -> &DropoutStats {
        &self.stats
    }
}

/// [`dropout_stats`] evaluated at each of the trailing `months` month ends,
/// oldest first.
pub fn dropout_report(
    children: &[ChildHistory],
    now: &Zoned,
    months: u32,
    calendar: Calendar,
) -> Vec<MonthlyDropout> {
    trailing_months(calendar.civil_date(now), months)
        .into_iter()
        .map(|window| {
            let stats = dropout_stats(children, window.end(), calendar);
            debug!(
                "dropout {}: {}/{} completed",
                window.label(),
                stats.children_completed,
                stats.children_started
            );
            MonthlyDropout {
                month: window.label(),
                stats,
            }
        })
        .collect()
}

/// Doses that were due in a month against doses actually administered in it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct WastageStats {
    expected: usize,
    actual: usize,
    wasted: usize,
    rate: f64,
}

impl WastageStats {
    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn actual(&self) -> usize {
        self.actual
    }

    pub fn wasted(&self) -> usize {
        self.wasted
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    fn finalize(&mut self) {
        self.wasted = self.expected - self.actual;
        self.rate = if self.expected > 0 {
            round4(self.wasted as f64 / self.expected as f64)
        } else {
            0.0
        };
    }
}

/// Per-vaccine wastage, keyed the way the reporting API spells vaccines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct VaccineWastage {
    #[serde(rename = "A")]
    a: WastageStats,
    #[serde(rename = "B")]
    b: WastageStats,
    #[serde(rename = "C")]
    c: WastageStats,
}

impl VaccineWastage {
    pub fn get(&self, vaccine: Vaccine) -> &WastageStats {
        match vaccine {
            Vaccine::A => &self.a,
            Vaccine::B => &self.b,
            Vaccine::C => &self.c,
        }
    }

    fn slot(&mut self, vaccine: Vaccine) -> &mut WastageStats {
        match vaccine {
            Vaccine::A => &mut self.a,
            Vaccine::B => &mut self.b,
            Vaccine::C => &mut self.c,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MonthlyWastage {
    month: String,
    wastage: VaccineWastage,
}

impl MonthlyWastage {
    pub fn month(&self) -> &str {
        &self.month
    }

    pub fn wastage(&self) -> &VaccineWastage {
        &self.wastage
    }
}

/// Expected against administered doses for each of the trailing `months`
/// calendar months, oldest first.
///
/// Every dose window is assessed on its own here, with no precedence walk:
/// a child overdue for A whose B window also overlaps the month counts
/// toward both vaccines.
pub fn wastage_report(
    children: &[ChildHistory],
    now: &Zoned,
    months: u32,
    calendar: Calendar,
) -> Vec<MonthlyWastage> {
    trailing_months(calendar.civil_date(now), months)
        .into_iter()
        .map(|window| MonthlyWastage {
            month: window.label(),
            wastage: month_wastage(children, window, calendar),
        })
        .collect()
}

fn month_wastage(children: &[ChildHistory], window: MonthWindow, calendar: Calendar) -> VaccineWastage {
    let mut wastage = VaccineWastage::default();
    for child in children {
        let dob = calendar.civil_date(child.date_of_birth());
        let before = child.doses_where(calendar, |day| day < window.start());
        let during = child.doses_where(calendar, |day| window.start() <= day && day <= window.end());
        for vaccine in Vaccine::ORDER {
            let due = vaccine.dose_window().around(dob);
            if due.start() > window.end() || due.end() < window.start() {
                continue;
            }
            // A dose received before the month opened was not expected in it.
            if before.contains(&vaccine) {
                continue;
            }
            let stats = wastage.slot(vaccine);
            stats.expected += 1;
            if during.contains(&vaccine) {
                stats.actual += 1;
            }
        }
    }
    for vaccine in Vaccine::ORDER {
        wastage.slot(vaccine).finalize();
    }
    debug!(
        "wastage {}: expected A/B/C {}/{}/{}",
        window.label(),
        wastage.a.expected,
        wastage.b.expected,
        wastage.c.expected
    );
    wastage
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::VisitOutcome;
    use anyhow::Result;
    use jiff::civil::date;

    fn ist(y: i16, mo: i8, d: i8) -> Result<Zoned> {
        Ok(date(y, mo, d).to_zoned(Calendar::ist().time_zone())?)
    }

    fn child(dob: Zoned, visits: Vec<VaccinationVisit>) -> ChildHistory {
        ChildHistory::new(dob, visits)
    }

    fn visit(outcome: VisitOutcome, y: i16, mo: i8, d: i8) -> Result<VaccinationVisit> {
        Ok(VaccinationVisit::new(outcome, ist(y, mo, d)?))
    }

    #[test]
    fn test_vaccine_demand_for_outreach_week() -> Result<()> {
        let children = vec![
            // A long overdue, still counted for the visit.
            child(ist(2025, 10, 1)?, vec![]),
            // A given; B window (1 to 15 Dec) overlaps the queried week.
            child(ist(2025, 10, 20)?, vec![visit(VisitOutcome::A, 2025, 10, 22)?]),
            // Full course, nothing needed.
            child(
                ist(2025, 6, 1)?,
                vec![
                    visit(VisitOutcome::A, 2025, 6, 2)?,
                    visit(VisitOutcome::B, 2025, 7, 15)?,
                    visit(VisitOutcome::C, 2025, 9, 1)?,
                ],
            ),
        ];
        let report = vaccine_demand(
            &children,
            &ist(2025, 12, 1)?,
            &ist(2025, 12, 7)?,
            Calendar::ist(),
        );
        assert_eq!(1, report.demand().get(Vaccine::A));
        assert_eq!(1, report.demand().get(Vaccine::B));
        assert_eq!(0, report.demand().get(Vaccine::C));
        assert_eq!(3, report.total_children());
        assert_eq!(2, report.children_needing_vaccines());
        Ok(())
    }

    #[test]
    fn test_demand_wire_shape() -> Result<()> {
        let children = vec![child(ist(2025, 10, 1)?, vec![])];
        let report = vaccine_demand(
            &children,
            &ist(2025, 12, 1)?,
            &ist(2025, 12, 7)?,
            Calendar::ist(),
        );
        let json = serde_json::to_value(&report)?;
        assert_eq!(1, json["demand"]["A"]);
        assert_eq!(0, json["demand"]["B"]);
        assert_eq!(1, json["totalChildren"]);
        assert_eq!(1, json["childrenNeedingVaccines"]);
        Ok(())
    }

    #[test]
    fn test_dropout_stats_counts_and_rounding() -> Result<()> {
        let children = vec![
            child(ist(2025, 1, 1)?, vec![visit(VisitOutcome::A, 2025, 1, 2)?]),
            child(ist(2025, 1, 1)?, vec![visit(VisitOutcome::A, 2025, 1, 3)?]),
            child(
                ist(2025, 1, 1)?,
                vec![
                    visit(VisitOutcome::A, 2025, 1, 2)?,
                    visit(VisitOutcome::C, 2025, 4, 10)?,
                ],
            ),
            // Never started; contributes to neither count.
            child(ist(2025, 1, 1)?, vec![]),
        ];
        let stats = dropout_stats(&children, date(2025, 12, 31), Calendar::ist());
        assert_eq!(3, stats.children_started());
        assert_eq!(1, stats.children_completed());
        assert_eq!(0.6667, stats.dropout_rate());
        Ok(())
    }

    #[test]
    fn test_dropout_stats_ignores_visits_after_cutoff() -> Result<()> {
        let children = vec![child(
            ist(2025, 1, 1)?,
            vec![
                visit(VisitOutcome::A, 2025, 1, 2)?,
                visit(VisitOutcome::C, 2025, 4, 10)?,
            ],
        )];
        let stats = dropout_stats(&children, date(2025, 2, 28), Calendar::ist());
        assert_eq!(1, stats.children_started());
        assert_eq!(0, stats.children_completed());
        assert_eq!(1.0, stats.dropout_rate());
        Ok(())
    }

    #[test]
    fn test_dropout_stats_empty_cohort() {
        let stats = dropout_stats(&[], date(2025, 12, 31), Calendar::ist());
        assert_eq!(0, stats.children_started());
        assert_eq!(0.0, stats.dropout_rate());
    }

    #[test]
    fn test_dropout_report_month_progression() -> Result<()> {
        let children = vec![child(
            ist(2025, 11, 1)?,
            vec![
                visit(VisitOutcome::A, 2025, 12, 10)?,
                visit(VisitOutcome::C, 2026, 1, 5)?,
            ],
        )];
        let report = dropout_report(&children, &ist(2026, 1, 15)?, 2, Calendar::ist());
        assert_eq!(2, report.len());
        assert_eq!("2025-12", report[0].month());
        assert_eq!(1, report[0].stats().children_started());
        assert_eq!(0, report[0].stats().children_completed());
        assert_eq!(1.0, report[0].stats().dropout_rate());
        assert_eq!("2026-01", report[1].month());
        assert_eq!(1, report[1].stats().children_completed());
        assert_eq!(0.0, report[1].stats().dropout_rate());
        Ok(())
    }

    #[test]
    fn test_monthly_dropout_wire_shape() -> Result<()> {
        let children = vec![child(
            ist(2025, 11, 1)?,
            vec![visit(VisitOutcome::A, 2025, 12, 10)?],
        )];
        let report = dropout_report(&children, &ist(2025, 12, 15)?, 1, Calendar::ist());
        let json = serde_json::to_value(&report)?;
        assert_eq!("2025-12", json[0]["month"]);
        assert_eq!(1, json[0]["childrenStarted"]);
        assert_eq!(0, json[0]["childrenCompleted"]);
        assert_eq!(1.0, json[0]["dropoutRate"]);
        Ok(())
    }

    #[test]
    fn test_wastage_single_month() -> Result<()> {
        let children = vec![
            // A window 3 to 10 Jan, never vaccinated: expected, not given.
            child(ist(2026, 1, 3)?, vec![]),
            // Same window, dose given in the month: expected and given.
            child(ist(2026, 1, 3)?, vec![visit(VisitOutcome::A, 2026, 1, 5)?]),
            // A given back in December; only the B window (31 Jan on) still
            // touches the month.
            child(ist(2025, 12, 20)?, vec![visit(VisitOutcome::A, 2025, 12, 22)?]),
            // A never given and its window long past, B window 6 to 20 Jan:
            // counts toward B alone in January.
            child(ist(2025, 11, 25)?, vec![]),
        ];
        let report = wastage_report(&children, &ist(2026, 1, 15)?, 1, Calendar::ist());
        assert_eq!(1, report.len());
        assert_eq!("2026-01", report[0].month());

        let a = report[0].wastage().get(Vaccine::A);
        assert_eq!(2, a.expected());
        assert_eq!(1, a.actual());
        assert_eq!(1, a.wasted());
        assert_eq!(0.5, a.rate());

        let b = report[0].wastage().get(Vaccine::B);
        assert_eq!(2, b.expected());
        assert_eq!(0, b.actual());
        assert_eq!(1.0, b.rate());

        let c = report[0].wastage().get(Vaccine::C);
        assert_eq!(0, c.expected());
        assert_eq!(0.0, c.rate());
        Ok(())
    }

    #[test]
    fn test_wastage_missed_earlier_dose_does_not_mask_next_window() -> Result<()> {
        // No precedence in wastage: a never-vaccinated child whose A window
        // closed back in November is still expected for B in January.
        let children = vec![child(ist(2025, 11, 20)?, vec![])];
        let report = wastage_report(&children, &ist(2026, 1, 15)?, 1, Calendar::ist());
        let wastage = report[0].wastage();
        // B window runs 1 to 15 Jan; A's closed on 27 Nov.
        assert_eq!(0, wastage.get(Vaccine::A).expected());
        assert_eq!(1, wastage.get(Vaccine::B).expected());
        Ok(())
    }

    #[test]
    fn test_wastage_wire_shape() -> Result<()> {
        let children = vec![child(ist(2026, 1, 3)?, vec![])];
        let report = wastage_report(&children, &ist(2026, 1, 15)?, 1, Calendar::ist());
        let json = serde_json::to_value(&report)?;
        assert_eq!("2026-01", json[0]["month"]);
        assert_eq!(1, json[0]["wastage"]["A"]["expected"]);
        assert_eq!(0, json[0]["wastage"]["A"]["actual"]);
        assert_eq!(1, json[0]["wastage"]["A"]["wasted"]);
        assert_eq!(1.0, json[0]["wastage"]["A"]["rate"]);
        Ok(())
    }

    #[test]
    fn test_round4() {
        assert_eq!(0.3333, round4(1.0 / 3.0));
        assert_eq!(0.6667, round4(2.0 / 3.0));
        assert_eq!(0.5, round4(0.5));
    }
}
