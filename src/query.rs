//! Helpers shared by the list endpoints: `ordering`, `search` and date filters.

use std::str::FromStr;

use jiff::{Timestamp, civil::Date, tz::TimeZone};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, Order, QueryOrder, Select,
    sea_query::{Alias, Expr, IntoCondition, LikeExpr, SimpleExpr},
};

use crate::error::{AppError, AppResult};

/// Parses `ordering=name,-year` against the fields a list allows.
pub fn parse_ordering<C: Copy>(
    raw: Option<&str>,
    allowed: &[(&'static str, C)],
) -> AppResult<Vec<(C, Order)>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| {
            let (name, order) = match field.strip_prefix('-') {
                Some(name) => (name, Order::Desc),
                None => (field, Order::Asc),
            };
            allowed
                .iter()
                .find(|(allowed_name, _)| *allowed_name == name)
                .map(|(_, column)| (*column, order))
                .ok_or_else(|| AppError::bad_parameter(format!("cannot order by '{name}'")))
        })
        .collect()
}

/// Applies the requested ordering, then `id` ascending as a stable tail.
pub fn apply_ordering<E: EntityTrait>(
    mut select: Select<E>,
    ordering: Vec<(E::Column, Order)>,
    id: E::Column,
) -> Select<E> {
    for (column, order) in ordering {
        select = select.order_by(column, order);
    }
    select.order_by_asc(id)
}

/// Case-insensitive (for ASCII) substring match, with `%` and `_` taken literally.
pub fn icontains<C: ColumnTrait>(column: C, term: &str) -> SimpleExpr {
    column.like(like_pattern(term))
}

pub fn like_pattern(term: &str) -> LikeExpr {
    LikeExpr::new(format!("%{}%", escape_like(term))).escape('\\')
}

/// Substring match on the text form of a numeric column.
pub fn text_contains<C: ColumnTrait + 'static>(column: C, term: &str) -> SimpleExpr {
    Expr::expr(Expr::cast_as(Expr::col((column.entity_name(), column)), Alias::new("TEXT")))
        .like(like_pattern(term))
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// `search=term` across several columns; `None` for a missing or blank term.
pub fn search_condition<F>(term: Option<&str>, build: F) -> Option<Condition>
where
    F: FnOnce(&str) -> Vec<SimpleExpr>,
{
    let term = term.map(str::trim).filter(|t| !t.is_empty())?;
    Some(build(term).into_iter().fold(Condition::any(), |cond, expr| cond.add(expr.into_condition())))
}

/// A query parameter with surrounding whitespace removed; blank counts as absent.
pub fn param(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub fn parse_number<T: FromStr>(name: &str, raw: &Option<String>) -> AppResult<Option<T>> {
    param(raw)
        .map(|value| {
            value.parse().map_err(|_| AppError::bad_parameter(format!("{name} must be a number")))
        })
        .transpose()
}

/// `updated_at_gte` / `updated_at_lte` on a unix-seconds column.
pub fn day_range<C: ColumnTrait>(
    column: C,
    gte: &Option<String>,
    lte: &Option<String>,
) -> AppResult<Condition> {
    let mut cond = Condition::all();
    if let Some(raw) = param(gte) {
        cond = cond.add(column.gte(day_start(parse_day("updated_at_gte", raw)?)?));
    }
    if let Some(raw) = param(lte) {
        cond = cond.add(column.lt(day_end_exclusive(parse_day("updated_at_lte", raw)?)?));
    }
    Ok(cond)
}

/// Parses `DD.MM.YYYY`, the format used by the timestamp filters.
pub fn parse_day(name: &str, raw: &str) -> AppResult<Date> {
    Date::strptime("%d.%m.%Y", raw.trim())
        .map_err(|_| AppError::bad_parameter(format!("{name} must be a date in DD.MM.YYYY format")))
}

/// First second of the day, UTC.
pub fn day_start(date: Date) -> AppResult<i64> {
    let zoned = date.to_zoned(TimeZone::UTC).map_err(|e| AppError::Internal(e.into()))?;
    Ok(zoned.timestamp().as_second())
}

/// First second after the day, UTC, so `lte` filters include the whole day.
pub fn day_end_exclusive(date: Date) -> AppResult<i64> {
    let next = date.tomorrow().map_err(|e| AppError::bad_parameter(e.to_string()))?;
    day_start(next)
}

/// Accepts `YYYY-MM-DD` or `DD.MM.YYYY`, returns the ISO form stored in the database.
///
/// Years are limited to 1..=9999 so the stored text always starts with four year digits.
pub fn parse_calendar_date(name: &str, raw: &str) -> AppResult<String> {
    let raw = raw.trim();
    let date = raw
        .parse::<Date>()
        .or_else(|_| Date::strptime("%d.%m.%Y", raw))
        .map_err(|_| {
            AppError::invalid(format!("{name} must be a date in YYYY-MM-DD or DD.MM.YYYY format"))
        })?;
    if date.year() < 1 {
        return Err(AppError::invalid(format!("{name} must be in year 1 or later")));
    }
    Ok(date.to_string())
}

/// The year of an ISO date column as an integer, NULL when the date is NULL.
pub fn year_of<C: ColumnTrait + 'static>(column: C) -> Expr {
    Expr::expr(Expr::cust_with_expr(
        "CAST(substr($1, 1, 4) AS INTEGER)",
        Expr::col((column.entity_name(), column)),
    ))
}

pub fn format_rfc3339(seconds: i64) -> String {
    Timestamp::from_second(seconds).map(|ts| ts.to_string()).unwrap_or_default()
}

pub fn format_display(seconds: i64) -> String {
    Timestamp::from_second(seconds)
        .map(|ts| ts.to_zoned(TimeZone::UTC).strftime("%d.%m.%Y | %H:%M:%S").to_string())
        .unwrap_or_default()
}
