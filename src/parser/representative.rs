use std::sync::LazyLock;

use regex::Regex;

use crate::schema::lexicon;
use crate::utils::{clean_cell, non_empty};

static BIRTH_JP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日\s*(?:生まれ|生)?").unwrap()
});
static BIRTH_NUM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})[/.\-](\d{1,2})[/.\-](\d{1,2})\s*(?:生まれ|生)?").unwrap()
});
static ASIDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)|【[^】]*】|\[[^\]]*\]").unwrap());

const SEPARATORS: [char; 6] = [' ', ':', '・', '/', '|', '、'];
const TRAILING_TITLES: [&str; 3] = ["様", "氏", "殿"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Representative {
    pub name: Option<String>,
    /// ISO `YYYY-MM-DD`.
    pub birth_date: Option<String>,
}

/// Split a representative cell into a bare name and an optional birth date.
/// `代表取締役社長 山田太郎（1960年4月1日生）` -> `山田太郎`, `1960-04-01`.
pub fn parse_representative(raw: &str) -> Representative {
    let mut s = clean_cell(raw);
    let mut birth_date = None;

    for re in [&*BIRTH_JP_RE, &*BIRTH_NUM_RE] {
        let found = re.captures_iter(&s).find_map(|caps| {
            let date = valid_date(&caps[1], &caps[2], &caps[3])?;
            Some((caps.get(0)?.range(), date))
        });
        if let Some((range, date)) = found {
            birth_date = Some(date);
            s.replace_range(range, " ");
            break;
        }
    }

    let s = ASIDE_RE.replace_all(&s, " ");
    let name = strip_titles(&s);
    Representative {
        name: non_empty(&name),
        birth_date,
    }
}

pub fn parse_birth_date(raw: &str) -> Option<String> {
    let s = clean_cell(raw);
    [&*BIRTH_JP_RE, &*BIRTH_NUM_RE]
        .into_iter()
        .find_map(|re| re.captures_iter(&s).find_map(|c| valid_date(&c[1], &c[2], &c[3])))
}

/// Range check only: year 1900-2100, month 1-12, day 1-31. `2月30日` passes.
fn valid_date(y: &str, m: &str, d: &str) -> Option<String> {
    let (y, m, d): (u32, u32, u32) = (y.parse().ok()?, m.parse().ok()?, d.parse().ok()?);
    let ok = (1900..=2100).contains(&y) && (1..=12).contains(&m) && (1..=31).contains(&d);
    ok.then(|| format!("{:04}-{:02}-{:02}", y, m, d))
}

fn strip_titles(raw: &str) -> String {
    let honorifics = &lexicon().honorifics;
    let mut s = raw.trim_matches(&SEPARATORS[..]).to_string();
    loop {
        let before = s.len();
        for h in honorifics {
            let stripped = if s.is_char_boundary(h.len()) && s[..h.len()].eq_ignore_ascii_case(h) {
                Some(s[h.len()..].to_string())
            } else {
                None
            };
            if let Some(rest) = stripped {
                s = rest.trim_start_matches(&SEPARATORS[..]).to_string();
                break;
            }
        }
        for t in TRAILING_TITLES {
            if let Some(rest) = s.strip_suffix(t) {
                s = rest.trim_end().to_string();
            }
        }
        if s.len() == before {
            break;
        }
    }
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_titles_and_birth_date() {
        let r = parse_representative("代表取締役社長 山田太郎（1960年4月1日生）");
        assert_eq!(r.name.as_deref(), Some("山田太郎"));
        assert_eq!(r.birth_date.as_deref(), Some("1960-04-01"));
    }

    #[test]
    fn nested_titles() {
        let r = parse_representative("代表者：代表取締役 佐藤 花子 様");
        assert_eq!(r.name.as_deref(), Some("佐藤 花子"));
        assert_eq!(r.birth_date, None);
    }

    #[test]
    fn numeric_birth_dates_are_validated() {
        let r = parse_representative("鈴木一郎 1975/12/31生まれ");
        assert_eq!(r.name.as_deref(), Some("鈴木一郎"));
        assert_eq!(r.birth_date.as_deref(), Some("1975-12-31"));

        let bad = parse_representative("鈴木一郎 1975/13/40");
        assert_eq!(bad.birth_date, None);
    }

    #[test]
    fn asides_removed() {
        let r = parse_representative("CEO John Smith【創業者】");
        assert_eq!(r.name.as_deref(), Some("John Smith"));
    }

    #[test]
    fn title_only_is_empty() {
        assert_eq!(parse_representative("代表取締役").name, None);
        assert_eq!(parse_representative("－").name, None);
    }

    #[test]
    fn birth_date_cell() {
        assert_eq!(parse_birth_date("1960年4月1日").as_deref(), Some("1960-04-01"));
        assert_eq!(parse_birth_date("1960-02-30").as_deref(), Some("1960-02-30"));
        assert_eq!(parse_birth_date("1960年2月30日").as_deref(), Some("1960-02-30"));
        assert_eq!(parse_birth_date("1960-02-32"), None);
        assert_eq!(parse_birth_date("1899-01-01"), None);
    }
}
