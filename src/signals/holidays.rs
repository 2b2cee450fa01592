use std::collections::HashMap;

use chrono::NaiveDate;

use crate::style::StyleCatalog;

fn lookup<'a, T>(table: &'a HashMap<String, T>, date: NaiveDate) -> Option<&'a T> {
    table
        .get(&date.format("%Y-%m-%d").to_string())
        .or_else(|| table.get(&date.format("%m-%d").to_string()))
}

/// `["a"]` → `"a"`, `["a", "b", "c"]` → `"a, b and c"`.
pub fn join_with_and(items: &[String]) -> Option<String> {
    match items {
        [] => None,
        [only] => Some(only.clone()),
        [head @ .., last] => Some(format!("{} and {}", head.join(", "), last)),
    }
}

pub fn holiday_for(catalog: &StyleCatalog, date: NaiveDate) -> Option<String> {
    lookup(&catalog.holidays, date).cloned()
}

pub fn silly_days_for(catalog: &StyleCatalog, date: NaiveDate) -> Option<String> {
    lookup(&catalog.silly_days, date).and_then(|names| join_with_and(names))
}

/// Every named occasion for the date, holiday first; stored alongside the day's prompts.
pub fn todays_holidays_display(catalog: &StyleCatalog, date: NaiveDate) -> Vec<String> {
    let mut names = Vec::new();
    if let Some(holiday) = lookup(&catalog.holidays, date) {
        names.push(holiday.clone());
    }
    if let Some(silly_days) = lookup(&catalog.silly_days, date) {
        names.extend(silly_days.iter().cloned());
    }
    names
}
