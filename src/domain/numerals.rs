//! Vernacular numeral conversion: an alphabetic numeration system used
//! in the source domain, convertible to/from integers by a static
//! lookup table.
//!
//! The resolver's `build_ref` accepts chapter/paragraph numbers either
//! as plain integers or as vernacular numerals and must normalize to an
//! integer before building a reference string.

/// Letter-value table for the alphabetic (Hebrew gematria) numeral
/// system, ones/tens/hundreds place values.
const LETTER_VALUES: &[(char, u32)] = &[
    ('א', 1),
    ('ב', 2),
    ('ג', 3),
    ('ד', 4),
    ('ה', 5),
    ('ו', 6),
    ('ז', 7),
    ('ח', 8),
    ('ט', 9),
    ('י', 10),
    ('כ', 20),
    ('ל', 30),
    ('מ', 40),
    ('נ', 50),
    ('ס', 60),
    ('ע', 70),
    ('פ', 80),
    ('צ', 90),
    ('ק', 100),
    ('ר', 200),
    ('ש', 300),
    ('ת', 400),
];

fn letter_value(c: char) -> Option<u32> {
    LETTER_VALUES.iter().find(|(ch, _)| *ch == c).map(|(_, v)| *v)
}

/// Parses a vernacular numeral string into its integer value.
///
/// Returns `None` if the string contains no recognized numeral
/// letters. Punctuation such as the geresh (`'`) and gershayim (`"`)
/// abbreviation marks is ignored.
#[must_use]
pub fn parse_vernacular_numeral(input: &str) -> Option<u32> {
    let mut total = 0u32;
    let mut saw_letter = false;
    for c in input.chars() {
        if let Some(value) = letter_value(c) {
            total += value;
            saw_letter = true;
        }
    }
    saw_letter.then_some(total)
}

/// Renders an integer (1-400-ish) as a vernacular numeral string,
/// substituting the traditional `טו`/`טז` forms for 15/16 to avoid
/// spelling a name of God with `יה`/`יו`.
#[must_use]
pub fn to_vernacular_numeral(value: u32) -> String {
    match value {
        15 => return "טו".to_string(),
        16 => return "טז".to_string(),
        _ => {}
    }
    let mut remaining = value;
    let mut out = String::new();
    for &(letter, letter_value) in LETTER_VALUES.iter().rev() {
        while remaining >= letter_value {
            out.push(letter);
            remaining -= letter_value;
        }
    }
    out
}

/// Interprets a caller-supplied chapter/paragraph token as an integer,
/// first trying a plain base-10 parse and falling back to vernacular
/// numeral decoding via the lookup table.
#[must_use]
pub fn resolve_numeral(input: &str) -> Option<u32> {
    input
    .trim()
    .parse::<u32>()
    .ok()
    .or_else(|| parse_vernacular_numeral(input))
}
