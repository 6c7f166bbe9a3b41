//! Calendar attributes of the date dimension: SQL expressions for the ETL
//! templates, literal values for the sample DML.

use crate::dialect::Dialect;
use crate::star::CalendarPart;
use chrono::{Datelike, NaiveDate};
use dimforge_ingest_sql::SampleValue;

const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Expression computing `part` from the date (or timestamp) expression `date`.
///
/// ANSI SQL has no weekday extraction, so the weekday parts load as NULL there.
pub(super) fn expression(dialect: Dialect, part: CalendarPart, date: &str) -> String {
    match dialect {
        Dialect::Postgresql => postgresql(part, date),
        Dialect::Mysql => mysql(part, date),
        Dialect::Sqlite => sqlite(part, date),
        Dialect::Sqlserver => sqlserver(part, date),
        Dialect::Ansi => ansi(part, date),
    }
}

fn postgresql(part: CalendarPart, d: &str) -> String {
    match part {
        CalendarPart::FullDate => format!("CAST({d} AS DATE)"),
        CalendarPart::DayOfWeek => format!("CAST(EXTRACT(ISODOW FROM {d}) AS INTEGER)"),
        CalendarPart::DayName => format!("TO_CHAR({d}, 'FMDay')"),
        CalendarPart::MonthNumber => format!("CAST(EXTRACT(MONTH FROM {d}) AS INTEGER)"),
        CalendarPart::MonthName => format!("TO_CHAR({d}, 'FMMonth')"),
        CalendarPart::Quarter => format!("CAST(EXTRACT(QUARTER FROM {d}) AS INTEGER)"),
        CalendarPart::Year => format!("CAST(EXTRACT(YEAR FROM {d}) AS INTEGER)"),
        CalendarPart::IsWeekend => format!("EXTRACT(ISODOW FROM {d}) IN (6, 7)"),
    }
}

fn mysql(part: CalendarPart, d: &str) -> String {
    match part {
        CalendarPart::FullDate => format!("DATE({d})"),
        CalendarPart::DayOfWeek => format!("WEEKDAY({d}) + 1"),
        CalendarPart::DayName => format!("DAYNAME({d})"),
        CalendarPart::MonthNumber => format!("MONTH({d})"),
        CalendarPart::MonthName => format!("MONTHNAME({d})"),
        CalendarPart::Quarter => format!("QUARTER({d})"),
        CalendarPart::Year => format!("YEAR({d})"),
        CalendarPart::IsWeekend => format!("WEEKDAY({d}) >= 5"),
    }
}

fn sqlite(part: CalendarPart, d: &str) -> String {
    // strftime('%w') counts from Sunday = 0.
    let weekday = format!("STRFTIME('%w', {d})");
    let month = format!("CAST(STRFTIME('%m', {d}) AS INTEGER)");
    match part {
        CalendarPart::FullDate => format!("DATE({d})"),
        CalendarPart::DayOfWeek => format!("(CAST({weekday} AS INTEGER) + 6) % 7 + 1"),
        CalendarPart::DayName => {
            let sunday_first = (0..7).map(|i| (format!("'{i}'"), DAY_NAMES[(i + 6) % 7]));
            case(&weekday, sunday_first)
        }
        CalendarPart::MonthNumber => month,
        CalendarPart::MonthName => case(&month, month_arms()),
        CalendarPart::Quarter => format!("({month} + 2) / 3"),
        CalendarPart::Year => format!("CAST(STRFTIME('%Y', {d}) AS INTEGER)"),
        CalendarPart::IsWeekend => format!("CASE WHEN {weekday} IN ('0', '6') THEN 1 ELSE 0 END"),
    }
}

fn sqlserver(part: CalendarPart, d: &str) -> String {
    // Independent of the session's DATEFIRST setting.
    let iso_weekday = format!("((DATEPART(WEEKDAY, {d}) + @@DATEFIRST + 5) % 7 + 1)");
    match part {
        CalendarPart::FullDate => format!("CAST({d} AS DATE)"),
        CalendarPart::DayOfWeek => iso_weekday,
        CalendarPart::DayName => format!("DATENAME(WEEKDAY, {d})"),
        CalendarPart::MonthNumber => format!("MONTH({d})"),
        CalendarPart::MonthName => format!("DATENAME(MONTH, {d})"),
        CalendarPart::Quarter => format!("DATEPART(QUARTER, {d})"),
        CalendarPart::Year => format!("YEAR({d})"),
        CalendarPart::IsWeekend => format!("CASE WHEN {iso_weekday} >= 6 THEN 1 ELSE 0 END"),
    }
}

fn ansi(part: CalendarPart, d: &str) -> String {
    let month = format!("EXTRACT(MONTH FROM {d})");
    match part {
        CalendarPart::FullDate => format!("CAST({d} AS DATE)"),
        CalendarPart::DayOfWeek | CalendarPart::DayName | CalendarPart::IsWeekend => {
            "NULL".to_string()
        }
        CalendarPart::MonthNumber => month,
        CalendarPart::MonthName => case(&month, month_arms()),
        CalendarPart::Quarter => format!("({month} + 2) / 3"),
        CalendarPart::Year => format!("EXTRACT(YEAR FROM {d})"),
    }
}

fn month_arms() -> impl Iterator<Item = (String, &'static str)> {
    MONTH_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| ((i + 1).to_string(), *name))
}

fn case(subject: &str, arms: impl Iterator<Item = (String, &'static str)>) -> String {
    let whens: Vec<String> = arms
        .map(|(when, name)| format!("WHEN {when} THEN '{name}'"))
        .collect();
    format!("CASE {subject} {} END", whens.join(" "))
}

/// Date carried by a sample value: `YYYY-MM-DD`, optionally followed by a time.
pub(super) fn sample_date(value: &SampleValue) -> Option<NaiveDate> {
    let SampleValue::Text(text) = value else {
        return None;
    };
    let day = text.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Value of `part` for `date`.
pub(super) fn value(part: CalendarPart, date: NaiveDate) -> SampleValue {
    let weekday = date.weekday().number_from_monday();
    let number = |n: u32| SampleValue::number_from_literal(&n.to_string());
    match part {
        CalendarPart::FullDate => SampleValue::Text(date.format("%Y-%m-%d").to_string()),
        CalendarPart::DayOfWeek => number(weekday),
        CalendarPart::DayName => SampleValue::Text(DAY_NAMES[weekday as usize - 1].to_string()),
        CalendarPart::MonthNumber => number(date.month()),
        CalendarPart::MonthName => SampleValue::Text(MONTH_NAMES[date.month0() as usize].to_string()),
        CalendarPart::Quarter => number(date.month0() / 3 + 1),
        CalendarPart::Year => SampleValue::number_from_literal(&date.year().to_string()),
        CalendarPart::IsWeekend => SampleValue::Bool(weekday >= 6),
    }
}
