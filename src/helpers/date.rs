//! Date helpers: `now`, `dateTimeShift` and the `date`/`time` range pickers.
//!
//! Format patterns use date-fns tokens (`yyyy-MM-dd'T'HH:mm:ss`), translated
//! to chrono's strftime items before formatting. Dates are computed in the
//! local timezone.

use super::{arg, hash_arg, helper_error, value_helper};
use chrono::{
    DateTime, Datelike, Days, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike,
};
use handlebars::{Handlebars, Helper, RenderError};
use rand::Rng;
use serde_json::{Value, json};
use std::fmt::Write;

/// ISO 8601 with milliseconds and offset.
pub const DEFAULT_FORMAT: &str = "yyyy-MM-dd'T'HH:mm:ss.SSSxxx";

const INVALID_DATE: &str = "Invalid time value";

pub(crate) fn register(handlebars: &mut Handlebars<'static>) {
    handlebars.register_helper("now", value_helper(now));
    handlebars.register_helper("dateTimeShift", value_helper(date_time_shift));
    handlebars.register_helper("date", value_helper(date));
    handlebars.register_helper("time", value_helper(time));
}

fn now(h: &Helper<'_>) -> Result<Value, RenderError> {
    let pattern = match arg(h, 0) {
        Some(Value::String(pattern)) => pattern.as_str(),
        _ => DEFAULT_FORMAT,
    };
    Ok(Value::String(format_date(&Local::now(), pattern)?))
}

fn date_time_shift(h: &Helper<'_>) -> Result<Value, RenderError> {
    let start = match hash_arg(h, "date") {
        Some(Value::String(date)) => parse_date(date).ok_or_else(|| helper_error(INVALID_DATE))?,
        Some(Value::Number(millis)) => millis
            .as_f64()
            .and_then(|ms| Local.timestamp_millis_opt(ms as i64).single())
            .ok_or_else(|| helper_error(INVALID_DATE))?,
        _ => Local::now(),
    };

    let offset = |name: &str| match hash_arg(h, name) {
        Some(Value::Number(n)) => n.as_f64().map(|f| f.trunc() as i64),
        _ => None,
    };
    let shift = Shift {
        days: offset("days"),
        months: offset("months"),
        years: offset("years"),
        hours: offset("hours"),
        minutes: offset("minutes"),
        seconds: offset("seconds"),
    };
    let shifted = shift.apply(start).ok_or_else(|| helper_error(INVALID_DATE))?;

    let pattern = match hash_arg(h, "format") {
        Some(Value::String(pattern)) => pattern.as_str(),
        _ => DEFAULT_FORMAT,
    };
    Ok(Value::String(format_date(&shifted, pattern)?))
}

/// `{{date from to [format]}}`: a random date between two dates.
fn date(h: &Helper<'_>) -> Result<Value, RenderError> {
    let (Some(Value::String(from)), Some(Value::String(to))) = (arg(h, 0), arg(h, 1)) else {
        return Ok(json!(""));
    };
    let from = parse_date(from).ok_or_else(|| helper_error(INVALID_DATE))?;
    let to = parse_date(to).ok_or_else(|| helper_error(INVALID_DATE))?;
    let picked = random_between(from, to);

    match arg(h, 2) {
        Some(Value::String(pattern)) => Ok(Value::String(format_date(&picked, pattern)?)),
        _ => Ok(Value::String(
            picked.format("%a %b %d %Y %H:%M:%S GMT%z").to_string(),
        )),
    }
}

/// `{{time from to [format]}}`: a random time of day between two `HH:mm` times.
fn time(h: &Helper<'_>) -> Result<Value, RenderError> {
    let (Some(Value::String(from)), Some(Value::String(to))) = (arg(h, 0), arg(h, 1)) else {
        return Ok(json!(""));
    };
    let from = parse_date(&format!("1970-01-01T{from}")).ok_or_else(|| helper_error(INVALID_DATE))?;
    let to = parse_date(&format!("1970-01-01T{to}")).ok_or_else(|| helper_error(INVALID_DATE))?;

    let pattern = match arg(h, 2) {
        Some(Value::String(pattern)) => pattern.as_str(),
        _ => "HH:mm",
    };
    Ok(Value::String(format_date(&random_between(from, to), pattern)?))
}

/// Field offsets applied by `dateTimeShift`, in declaration order.
#[derive(Debug, Default, Clone, Copy)]
pub struct Shift {
    pub days: Option<i64>,
    pub months: Option<i64>,
    pub years: Option<i64>,
    pub hours: Option<i64>,
    pub minutes: Option<i64>,
    pub seconds: Option<i64>,
}

impl Shift {
    /// Apply the offsets on local wall-clock time. Month and year shifts keep
    /// the day of month and let it overflow into the next month (Jan 31 plus
    /// one month is Mar 3 or Mar 2).
    pub fn apply(&self, date: DateTime<Local>) -> Option<DateTime<Local>> {
        let mut naive = date.naive_local();

        if let Some(days) = self.days {
            naive = naive.checked_add_signed(Duration::try_days(days)?)?;
        }
        if let Some(months) = self.months {
            naive = add_months(naive, months)?;
        }
        if let Some(years) = self.years {
            naive = add_months(naive, years.checked_mul(12)?)?;
        }
        if let Some(hours) = self.hours {
            naive = naive.checked_add_signed(Duration::try_hours(hours)?)?;
        }
        if let Some(minutes) = self.minutes {
            naive = naive.checked_add_signed(Duration::try_minutes(minutes)?)?;
        }
        if let Some(seconds) = self.seconds {
            naive = naive.checked_add_signed(Duration::try_seconds(seconds)?)?;
        }

        Local.from_local_datetime(&naive).earliest()
    }
}

fn add_months(date: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let total = (i64::from(date.year()) * 12 + i64::from(date.month0())).checked_add(months)?;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = total.rem_euclid(12) as u32 + 1;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let day = first.checked_add_signed(Duration::try_days(i64::from(date.day0()))?)?;
    Some(day.and_time(date.time()))
}

/// Parse a date string: RFC 3339, a local date-time without offset, a bare
/// date (local midnight) or RFC 2822.
pub fn parse_date(input: &str) -> Option<DateTime<Local>> {
    let input = input.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(input) {
        return Some(date.with_timezone(&Local));
    }

    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        });
    if let Some(naive) = naive {
        return Local.from_local_datetime(&naive).earliest();
    }

    DateTime::parse_from_rfc2822(input)
        .ok()
        .map(|date| date.with_timezone(&Local))
}

/// Uniformly random instant between two dates, in either order.
pub fn random_between(from: DateTime<Local>, to: DateTime<Local>) -> DateTime<Local> {
    let (from, to) = if from <= to { (from, to) } else { (to, from) };
    let span = (to - from).num_milliseconds();
    if span <= 0 {
        return from;
    }
    let offset = rand::thread_rng().gen_range(0..=span);
    Duration::try_milliseconds(offset)
        .and_then(|offset| from.checked_add_signed(offset))
        .unwrap_or(from)
}

/// Format a date with a date-fns pattern.
pub fn format_date(date: &DateTime<Local>, pattern: &str) -> Result<String, RenderError> {
    let items = translate(pattern, date).map_err(helper_error)?;
    let mut formatted = String::new();
    write!(formatted, "{}", date.format(&items))
        .map_err(|_| helper_error(format!("Invalid date format: {pattern}")))?;
    Ok(formatted)
}

/// Translate a date-fns pattern into a chrono strftime string. Tokens chrono
/// has no item for are computed from `date` and inserted as text.
fn translate(pattern: &str, date: &DateTime<Local>) -> Result<String, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            // '' is a literal quote, otherwise a quoted literal runs to the next lone quote
            if chars.get(i + 1) == Some(&'\'') {
                out.push('\'');
                i += 2;
                continue;
            }
            i += 1;
            while i < chars.len() {
                if chars[i] == '\'' {
                    if chars.get(i + 1) == Some(&'\'') {
                        out.push('\'');
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                push_literal(&mut out, chars[i]);
                i += 1;
            }
            continue;
        }

        if c.is_ascii_alphabetic() {
            let start = i;
            while i < chars.len() && chars[i] == c {
                i += 1;
            }
            let len = i - start;

            // `do`, `Mo`, `Qo`, ...: the number as an ordinal
            let item = if c != 'o' && chars.get(i) == Some(&'o') {
                i += 1;
                numeric(c, date).map(|n| format!("{n}{}", ordinal_suffix(n)))
            } else {
                token(c, len, date)
            };
            let item = item.ok_or_else(|| {
                format!("Format string contains an unescaped latin alphabet character `{c}`")
            })?;
            out.push_str(&item);
            continue;
        }

        push_literal(&mut out, c);
        i += 1;
    }

    Ok(out)
}

fn push_literal(out: &mut String, c: char) {
    match c {
        '%' => out.push_str("%%"),
        c => out.push(c),
    }
}

fn padded(n: i64, len: usize) -> String {
    format!("{n:0len$}")
}

fn ordinal_suffix(n: i64) -> &'static str {
    match (n % 100, n % 10) {
        (11..=13, _) => "th",
        (_, 1) => "st",
        (_, 2) => "nd",
        (_, 3) => "rd",
        _ => "th",
    }
}

/// Numeric value of a token letter, for ordinals and computed fields.
fn numeric(c: char, date: &DateTime<Local>) -> Option<i64> {
    let n = match c {
        'y' | 'u' => i64::from(date.year()),
        'Y' | 'R' => i64::from(date.iso_week().year()),
        'Q' | 'q' => i64::from(date.month0() / 3 + 1),
        'M' | 'L' => i64::from(date.month()),
        'w' => local_week(date.date_naive())?,
        'I' => i64::from(date.iso_week().week()),
        'd' => i64::from(date.day()),
        'D' => i64::from(date.ordinal()),
        'e' | 'c' => i64::from(date.weekday().num_days_from_sunday() + 1),
        'i' => i64::from(date.weekday().number_from_monday()),
        'H' => i64::from(date.hour()),
        'h' => i64::from((date.hour() + 11) % 12 + 1),
        'k' => i64::from(if date.hour() == 0 { 24 } else { date.hour() }),
        'K' => i64::from(date.hour() % 12),
        'm' => i64::from(date.minute()),
        's' => i64::from(date.second()),
        _ => return None,
    };
    Some(n)
}

/// Week of the year with weeks starting on Sunday, week 1 being the week of January 1st.
fn local_week(date: NaiveDate) -> Option<i64> {
    let week_start = |d: NaiveDate| {
        d.checked_sub_days(Days::new(u64::from(d.weekday().num_days_from_sunday())))
    };
    let next_year = NaiveDate::from_ymd_opt(date.year() + 1, 1, 1).and_then(week_start)?;
    if date >= next_year {
        return Some(1);
    }
    let first = NaiveDate::from_ymd_opt(date.year(), 1, 1).and_then(week_start)?;
    Some((date - first).num_days() / 7 + 1)
}

fn token(c: char, len: usize, date: &DateTime<Local>) -> Option<String> {
    let weekday = || date.format("%A").to_string();
    let item = match (c, len) {
        ('y' | 'u', 2) => "%y",
        ('y' | 'u', _) => "%Y",
        ('Y' | 'R', 2) => "%g",
        ('Y' | 'R', _) => "%G",
        ('Q' | 'q', 1 | 2) => return Some(padded(numeric(c, date)?, len)),
        ('Q' | 'q', 3) => return Some(format!("Q{}", numeric(c, date)?)),
        ('Q' | 'q', 4) => {
            let quarter = numeric(c, date)?;
            return Some(format!("{quarter}{} quarter", ordinal_suffix(quarter)));
        }
        ('Q' | 'q', _) => return Some(numeric(c, date)?.to_string()),
        ('M' | 'L', 1) => "%-m",
        ('M' | 'L', 2) => "%m",
        ('M' | 'L', 3) => "%b",
        ('M' | 'L', 4) => "%B",
        ('M' | 'L', _) => return Some(date.format("%B").to_string().chars().take(1).collect()),
        ('w', _) => return Some(padded(numeric(c, date)?, len)),
        ('I', 1) => "%-V",
        ('I', _) => "%V",
        ('d', 1) => "%-d",
        ('d', _) => "%d",
        ('D', 1) => "%-j",
        ('D', _) => "%j",
        ('E', 1..=3) => "%a",
        ('E', 4) => "%A",
        ('E', 5) => return Some(weekday().chars().take(1).collect()),
        ('E', _) => return Some(weekday().chars().take(2).collect()),
        ('e' | 'c' | 'i', 1 | 2) => return Some(padded(numeric(c, date)?, len)),
        ('e' | 'c' | 'i', 3) => "%a",
        ('e' | 'c' | 'i', 4) => "%A",
        ('e' | 'c' | 'i', 5) => return Some(weekday().chars().take(1).collect()),
        ('e' | 'c' | 'i', _) => return Some(weekday().chars().take(2).collect()),
        ('G', _) => match (len, date.year() > 0) {
            (1..=3, true) => "AD",
            (1..=3, false) => "BC",
            (4, true) => "Anno Domini",
            (4, false) => "Before Christ",
            (_, true) => "A",
            (_, false) => "B",
        },
        ('H', 1) => "%-H",
        ('H', _) => "%H",
        ('h', 1) => "%-I",
        ('h', _) => "%I",
        ('k' | 'K', _) => return Some(padded(numeric(c, date)?, len)),
        ('m', 1) => "%-M",
        ('m', _) => "%M",
        ('s', 1) => "%-S",
        ('s', _) => "%S",
        ('S', 3) => "%3f",
        ('S', 6) => "%6f",
        ('S', 9) => "%9f",
        ('S', _) => {
            let mut digits = format!("{:09}", date.nanosecond() % 1_000_000_000);
            digits.truncate(len);
            return Some(format!("{digits:0<len$}"));
        }
        ('a', 3) => "%P",
        ('a', _) => "%p",
        ('x' | 'X', 1 | 2) => "%z",
        ('x' | 'X', _) => "%:z",
        ('t', _) => "%s",
        ('T', _) => return Some(date.timestamp_millis().to_string()),
        ('P', 1) => return translate("MM/dd/yyyy", date).ok(),
        ('P', 2) => return translate("MMM d, y", date).ok(),
        ('P', 3) => return translate("MMMM do, y", date).ok(),
        ('P', _) => return translate("EEEE, MMMM do, y", date).ok(),
        ('p', 1) => return translate("h:mm a", date).ok(),
        ('p', _) => return translate("h:mm:ss a", date).ok(),
        _ => return None,
    };
    Some(item.to_string())
}
