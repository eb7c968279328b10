//! Spanish relative date expression parsing.
//!
//! Resolves phrases such as "mañana a las 3pm", "en 2 semanas" or
//! "próximo lunes" into absolute timestamps against a caller-supplied
//! reference instant. Everything here is pure; no clock is read.

use std::sync::LazyLock;

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use regex::{Captures, Regex};
use serde::Serialize;

use crate::text::fold;

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)(?P<pasado>\bpasado\s+ma(?:ñ|n)ana\b)",
        r"|(?P<hoy>\bhoy\b)",
        r"|(?P<manana>\bma(?:ñ|n)ana\b)",
        r"|\ben\s+(?P<count>\d{1,3}|una?|dos|tres|cuatro|cinco|seis|siete|ocho|nueve|diez|quince)\s+(?P<unit>d(?:í|i)as?|semanas?)\b",
        r"|(?:\b(?P<next>pr(?:ó|o)xim[oa]|siguiente)\s+)?\b(?P<weekday>lunes|martes|mi(?:é|e)rcoles|jueves|viernes|s(?:á|a)bado|domingo)\b(?:\s+(?:pr(?:ó|o)xim[oa]|que\s+viene)\b)?",
        r"|\b(?P<year>\d{4})-(?P<month>\d{1,2})-(?P<day>\d{1,2})(?:[T\s](?P<ihour>\d{1,2}):(?P<iminute>\d{2})(?::\d{2})?)?\b",
        r"|\b(?P<dday>\d{1,2})/(?P<dmonth>\d{1,2})/(?P<dyear>\d{4})\b",
    ))
    .unwrap()
});

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\ba\s+las?\s+(?P<hour>\d{1,2})(?::(?P<minute>\d{2}))?",
        r"(?:\s*(?P<meridiem>[ap]\.\s?m\.|[ap]m\b)",
        r"|\s+de\s+la\s+(?P<period>ma(?:ñ|n)ana|tarde|noche)\b",
        r"|\s*(?:h|hrs|horas)\b)?",
    ))
    .unwrap()
});

/// A date expression found inside a longer text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateMention {
    /// Byte offset of the first character of the expression.
    pub start: usize,
    /// Byte offset one past the expression, including any time suffix.
    pub end: usize,
    pub text: String,
    pub value: NaiveDateTime,
    /// Whether an explicit wall-clock time was given.
    pub has_time: bool,
}

/// Resolve a date phrase against `reference`.
///
/// Returns `None` when the phrase contains no recognised date expression.
/// Relative expressions keep the reference time-of-day unless a time is
/// given; absolute dates without a time resolve to midnight.
pub fn resolve(phrase: &str, reference: NaiveDateTime) -> Option<NaiveDateTime> {
    let mention = scan(phrase, reference).into_iter().next()?;
    if mention.has_time {
        return Some(mention.value);
    }
    match find_time(phrase) {
        Some(time) => Some(mention.value.date().and_time(time)),
        None => Some(mention.value),
    }
}

/// Find every date expression in `text`, in order of appearance.
pub fn scan(text: &str, reference: NaiveDateTime) -> Vec<DateMention> {
    let mut mentions: Vec<DateMention> = Vec::new();

    for caps in DATE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        // inside the time suffix of the previous mention
        if mentions.last().is_some_and(|m| whole.start() < m.end) {
            continue;
        }
        // "por la mañana" / "de la mañana" is a time of day, not tomorrow
        if caps.name("manana").is_some() && follows_article(&text[..whole.start()]) {
            continue;
        }
        let Some((date, explicit)) = resolve_date(&caps, reference.date()) else {
            continue;
        };

        let mut end = whole.end();
        let mut time = explicit;
        if time.is_none() {
            if let Some((t, consumed)) = time_after(&text[end..]) {
                time = Some(t);
                end += consumed;
            }
        }

        let value = match time {
            Some(t) => date.and_time(t),
            None if is_relative(&caps) => date.and_time(reference.time()),
            None => match date.and_hms_opt(0, 0, 0) {
                Some(midnight) => midnight,
                None => continue,
            },
        };

        mentions.push(DateMention {
            start: whole.start(),
            end,
            text: text[whole.start()..end].to_string(),
            value,
            has_time: time.is_some(),
        });
    }

    mentions
}

/// The first valid time-of-day expression anywhere in `text`.
pub fn find_time(text: &str) -> Option<NaiveTime> {
    TIME_RE
        .captures_iter(text)
        .find_map(|caps| time_from_caps(&caps))
}

/// Next date strictly after `from` falling on `target`.
///
/// A weekday equal to today's resolves to next week.
pub fn next_weekday(from: NaiveDate, target: Weekday) -> Option<NaiveDate> {
    let current = from.weekday().num_days_from_monday();
    let wanted = target.num_days_from_monday();
    let diff = match (wanted + 7 - current) % 7 {
        0 => 7,
        d => d,
    };
    from.checked_add_days(Days::new(u64::from(diff)))
}

pub fn weekday_name_es(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "lunes",
        Weekday::Tue => "martes",
        Weekday::Wed => "miércoles",
        Weekday::Thu => "jueves",
        Weekday::Fri => "viernes",
        Weekday::Sat => "sábado",
        Weekday::Sun => "domingo",
    }
}

fn resolve_date(caps: &Captures, today: NaiveDate) -> Option<(NaiveDate, Option<NaiveTime>)> {
    if caps.name("pasado").is_some() {
        return Some((today.checked_add_days(Days::new(2))?, None));
    }
    if caps.name("hoy").is_some() {
        return Some((today, None));
    }
    if caps.name("manana").is_some() {
        return Some((today.checked_add_days(Days::new(1))?, None));
    }
    if let Some(count) = caps.name("count") {
        let n = parse_count(count.as_str())?;
        let unit = fold(caps.name("unit")?.as_str());
        let days = if unit.starts_with("semana") { n * 7 } else { n };
        return Some((today.checked_add_days(Days::new(days))?, None));
    }
    if let Some(day) = caps.name("weekday") {
        let target = parse_weekday(&fold(day.as_str()))?;
        return Some((next_weekday(today, target)?, None));
    }
    if let Some(year) = caps.name("year") {
        let date = NaiveDate::from_ymd_opt(
            year.as_str().parse().ok()?,
            caps.name("month")?.as_str().parse().ok()?,
            caps.name("day")?.as_str().parse().ok()?,
        )?;
        let time = match (caps.name("ihour"), caps.name("iminute")) {
            (Some(h), Some(m)) => Some(NaiveTime::from_hms_opt(
                h.as_str().parse().ok()?,
                m.as_str().parse().ok()?,
                0,
            )?),
            _ => None,
        };
        return Some((date, time));
    }
    if let Some(year) = caps.name("dyear") {
        let date = NaiveDate::from_ymd_opt(
            year.as_str().parse().ok()?,
            caps.name("dmonth")?.as_str().parse().ok()?,
            caps.name("dday")?.as_str().parse().ok()?,
        )?;
        return Some((date, None));
    }
    None
}

fn is_relative(caps: &Captures) -> bool {
    caps.name("year").is_none() && caps.name("dyear").is_none()
}

fn follows_article(prefix: &str) -> bool {
    prefix
        .trim_end()
        .rsplit(char::is_whitespace)
        .next()
        .is_some_and(|word| fold(word) == "la")
}

fn time_after(rest: &str) -> Option<(NaiveTime, usize)> {
    let caps = TIME_RE.captures(rest)?;
    let whole = caps.get(0)?;
    if !rest[..whole.start()].trim().is_empty() {
        return None;
    }
    Some((time_from_caps(&caps)?, whole.end()))
}

fn time_from_caps(caps: &Captures) -> Option<NaiveTime> {
    let mut hour: u32 = caps.name("hour")?.as_str().parse().ok()?;
    let minute: u32 = match caps.name("minute") {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };

    if let Some(meridiem) = caps.name("meridiem") {
        if hour == 0 || hour > 12 {
            return None;
        }
        let pm = meridiem.as_str().to_ascii_lowercase().starts_with('p');
        hour = match (pm, hour) {
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, 12) => 0,
            (false, h) => h,
        };
    } else if let Some(period) = caps.name("period") {
        hour = match (fold(period.as_str()).as_str(), hour) {
            ("tarde", h) if h < 12 => h + 12,
            ("noche", 12) => 0,
            ("noche", h) if (6..12).contains(&h) => h + 12,
            ("manana", 12) => 0,
            (_, h) => h,
        };
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn parse_count(word: &str) -> Option<u64> {
    if let Ok(n) = word.parse::<u64>() {
        return Some(n);
    }
    let n = match fold(word).as_str() {
        "un" | "una" => 1,
        "dos" => 2,
        "tres" => 3,
        "cuatro" => 4,
        "cinco" => 5,
        "seis" => 6,
        "siete" => 7,
        "ocho" => 8,
        "nueve" => 9,
        "diez" => 10,
        "quince" => 15,
        _ => return None,
    };
    Some(n)
}

fn parse_weekday(folded: &str) -> Option<Weekday> {
    match folded {
        "lunes" => Some(Weekday::Mon),
        "martes" => Some(Weekday::Tue),
        "miercoles" => Some(Weekday::Wed),
        "jueves" => Some(Weekday::Thu),
        "viernes" => Some(Weekday::Fri),
        "sabado" => Some(Weekday::Sat),
        "domingo" => Some(Weekday::Sun),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// Friday 2026-10-16 10:00.
    fn reference() -> NaiveDateTime {
        at(2026, 10, 16, 10, 0)
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    /// A spread of reference instants covering every weekday, month ends,
    /// a leap day and late-evening times.
    fn references() -> Vec<NaiveDateTime> {
        let start = at(2027, 12, 20, 23, 45);
        (0..400)
            .map(|i| start + Duration::days(i) - Duration::minutes(i * 7))
            .collect()
    }

    // =====================================================================
    // Properties over many reference instants
    // =====================================================================

    #[test]
    fn test_hoy_keeps_calendar_date() {
        for now in references() {
            let resolved = resolve("hoy", now).unwrap();
            assert_eq!(resolved.date(), now.date());
        }
    }

    #[test]
    fn test_manana_is_next_calendar_day() {
        for now in references() {
            let resolved = resolve("mañana", now).unwrap();
            assert_eq!(resolved.date(), now.date().succ_opt().unwrap());
        }
    }

    #[test]
    fn test_en_tres_dias() {
        for now in references() {
            let resolved = resolve("en 3 días", now).unwrap();
            assert_eq!(resolved.date(), now.date() + Duration::days(3));
        }
    }

    #[test]
    fn test_proximo_lunes_is_future_monday() {
        for now in references() {
            let resolved = resolve("próximo lunes", now).unwrap();
            assert!(resolved.date() > now.date());
            assert_eq!(resolved.weekday(), Weekday::Mon);
            assert!(resolved.date() - now.date() <= Duration::days(7));
        }
    }

    #[test]
    fn test_nonsense_is_none() {
        for now in references().into_iter().take(10) {
            assert!(resolve("texto sin sentido", now).is_none());
        }
        assert!(resolve("", reference()).is_none());
    }

    // =====================================================================
    // Grammar
    // =====================================================================

    #[test]
    fn test_same_weekday_resolves_to_next_week() {
        // reference is a Friday
        assert_eq!(resolve("viernes", reference()).unwrap().date(), at(2026, 10, 23, 0, 0).date());
    }

    #[test]
    fn test_relative_keeps_reference_time() {
        assert_eq!(resolve("mañana", reference()).unwrap(), at(2026, 10, 17, 10, 0));
    }

    #[test]
    fn test_manana_with_pm_time() {
        assert_eq!(
            resolve("mañana a las 3pm", reference()).unwrap(),
            at(2026, 10, 17, 15, 0)
        );
    }

    #[test]
    fn test_pasado_manana() {
        assert_eq!(
            resolve("pasado mañana", reference()).unwrap().date(),
            at(2026, 10, 18, 0, 0).date()
        );
    }

    #[test]
    fn test_weeks_with_word_number() {
        assert_eq!(
            resolve("en dos semanas", reference()).unwrap().date(),
            at(2026, 10, 30, 0, 0).date()
        );
        assert_eq!(
            resolve("en una semana", reference()).unwrap().date(),
            at(2026, 10, 23, 0, 0).date()
        );
    }

    #[test]
    fn test_accentless_spellings() {
        assert_eq!(
            resolve("proximo miercoles", reference()).unwrap().date(),
            at(2026, 10, 21, 0, 0).date()
        );
        assert_eq!(
            resolve("manana", reference()).unwrap().date(),
            at(2026, 10, 17, 0, 0).date()
        );
        assert_eq!(
            resolve("en 2 dias", reference()).unwrap().date(),
            at(2026, 10, 18, 0, 0).date()
        );
    }

    #[test]
    fn test_iso_date_without_time_is_midnight() {
        assert_eq!(resolve("2026-11-03", reference()).unwrap(), at(2026, 11, 3, 0, 0));
    }

    #[test]
    fn test_iso_date_with_time() {
        assert_eq!(
            resolve("2026-11-03 09:15", reference()).unwrap(),
            at(2026, 11, 3, 9, 15)
        );
        assert_eq!(
            resolve("2026-11-03T18:30:00", reference()).unwrap(),
            at(2026, 11, 3, 18, 30)
        );
    }

    #[test]
    fn test_day_month_year() {
        assert_eq!(resolve("25/12/2026", reference()).unwrap(), at(2026, 12, 25, 0, 0));
    }

    #[test]
    fn test_invalid_calendar_date_is_none() {
        assert!(resolve("2026-02-30", reference()).is_none());
        assert!(resolve("31/04/2026", reference()).is_none());
    }

    #[test]
    fn test_por_la_manana_is_not_tomorrow() {
        assert!(resolve("por la mañana", reference()).is_none());
    }

    #[test]
    fn test_time_of_day_periods() {
        assert_eq!(
            resolve("hoy a las 7 de la tarde", reference()).unwrap(),
            at(2026, 10, 16, 19, 0)
        );
        assert_eq!(
            resolve("mañana a las 9 de la mañana", reference()).unwrap(),
            at(2026, 10, 17, 9, 0)
        );
        assert_eq!(
            resolve("hoy a las 12 de la noche", reference()).unwrap(),
            at(2026, 10, 16, 0, 0)
        );
        assert_eq!(
            resolve("mañana a las 12am", reference()).unwrap(),
            at(2026, 10, 17, 0, 0)
        );
        assert_eq!(
            resolve("mañana a las 9:30 am", reference()).unwrap(),
            at(2026, 10, 17, 9, 30)
        );
        assert_eq!(
            resolve("mañana a la 1", reference()).unwrap(),
            at(2026, 10, 17, 1, 0)
        );
    }

    #[test]
    fn test_time_before_date_is_applied() {
        assert_eq!(
            resolve("a las 7 de la tarde del sábado", reference()).unwrap(),
            at(2026, 10, 17, 19, 0)
        );
    }

    #[test]
    fn test_out_of_range_time_is_ignored() {
        assert_eq!(
            resolve("mañana a las 25:00", reference()).unwrap(),
            at(2026, 10, 17, 10, 0)
        );
    }

    #[test]
    fn test_scan_finds_all_mentions_with_spans() {
        let text = "llamar a Juan mañana a las 3pm y revisar el informe el próximo lunes";
        let mentions = scan(text, reference());
        assert_eq!(mentions.len(), 2);

        assert_eq!(mentions[0].text, "mañana a las 3pm");
        assert_eq!(&text[mentions[0].start..mentions[0].end], "mañana a las 3pm");
        assert!(mentions[0].has_time);
        assert_eq!(mentions[0].value, at(2026, 10, 17, 15, 0));

        assert_eq!(mentions[1].text, "próximo lunes");
        assert!(!mentions[1].has_time);
        assert_eq!(mentions[1].value.date(), at(2026, 10, 19, 0, 0).date());
    }

    #[test]
    fn test_scan_empty_text() {
        assert!(scan("sin fechas aquí", reference()).is_empty());
    }

    #[test]
    fn test_next_weekday_table() {
        let friday = reference().date();
        assert_eq!(next_weekday(friday, Weekday::Sat).unwrap().day(), 17);
        assert_eq!(next_weekday(friday, Weekday::Thu).unwrap().day(), 22);
        assert_eq!(next_weekday(friday, Weekday::Fri).unwrap().day(), 23);
    }

    #[test]
    fn test_weekday_names() {
        assert_eq!(weekday_name_es(Weekday::Wed), "miércoles");
        assert_eq!(weekday_name_es(reference().weekday()), "viernes");
    }
}
