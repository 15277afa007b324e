#![warn(clippy::all, rust_2018_idioms)]

mod calendar;
mod report;
mod schedule;

pub use calendar::{add_days, parse_date, trailing_months, Calendar, MonthWindow};
pub use report::{
    dropout_report, dropout_stats, vaccine_demand, wastage_report, ChildHistory, DemandReport,
    DoseCounts, DropoutStats, MonthlyDropout, MonthlyWastage, VaccineWastage, WastageStats,
};
pub use schedule::{
    vaccination_status, vaccine_due_in_range, DoseWindow, DueStatus, DueWindow, VaccinationStatus,
    VaccinationVisit, Vaccine, VisitOutcome,
};
