use chrono::{
    DateTime,
    Datelike,
    Months,
    NaiveDate,
    Utc,
};

/// Minutes past midnight UTC at which the monthly run starts
const RUN_MINUTE: u32 = 5;

/// Next 00:05 UTC on the 1st of a month strictly after `now`
pub fn next_monthly_run(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let first = now.date_naive().with_day(1)?;
    let this_month = run_time(first)?;
    if now < this_month {
        return Some(this_month);
    }
    run_time(first.checked_add_months(Months::new(1))?)
}

fn run_time(day: NaiveDate) -> Option<DateTime<Utc>> {
    day.and_hms_opt(0, RUN_MINUTE, 0).map(|dt| dt.and_utc())
}
