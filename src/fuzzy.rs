//! Approximate matching of free-text guesses against canonical answers.
//!
//! Both sides are normalized (lowercase, diacritics folded, punctuation and
//! whitespace collapsed, a few domain synonyms canonicalized) and then
//! compared with progressively looser checks: exact equality, substring
//! containment, token-set Jaccard similarity, and an edit-distance ratio for
//! short strings.

/// Minimum length of the contained string for substring acceptance
const MIN_SUBSTRING_LEN: usize = 3;
/// Token-set Jaccard similarity needed to accept
const JACCARD_THRESHOLD: f64 = 0.70;
/// Edit-distance similarity ratio needed to accept
const EDIT_RATIO_THRESHOLD: f64 = 0.82;
/// Edit-distance check only applies when the longer string is this short
const EDIT_MAX_LEN: usize = 25;

/// Phrase rewrites applied on word boundaries, in order
const SYNONYMS: &[(&str, &str)] = &[
    ("x mas", "christmas"),
    ("xmas", "christmas"),
    ("father christmas", "santa"),
    ("santa claus", "santa"),
    ("saint nicholas", "santa"),
    ("st nicholas", "santa"),
    ("st nick", "santa"),
    ("kris kringle", "santa"),
    ("pere noel", "santa"),
    ("weihnachtsmann", "santa"),
    ("snow man", "snowman"),
    ("reindeers", "reindeer"),
    ("presents", "present"),
    ("gifts", "present"),
    ("gift", "present"),
];

/// Check whether `guess` is an acceptable match for `canonical`
pub fn matches(guess: &str, canonical: &str) -> bool {
    let guess = normalize(guess);
    let canonical = normalize(canonical);
    if guess.is_empty() || canonical.is_empty() {
        return false;
    }

    if guess == canonical {
        return true;
    }

    let (shorter, longer) = if guess.chars().count() <= canonical.chars().count() {
        (&guess, &canonical)
    } else {
        (&canonical, &guess)
    };
    if shorter.chars().count() >= MIN_SUBSTRING_LEN && longer.contains(shorter.as_str()) {
        return true;
    }

    if token_jaccard(&guess, &canonical) >= JACCARD_THRESHOLD {
        return true;
    }

    let longest = guess.chars().count().max(canonical.chars().count());
    if longest <= EDIT_MAX_LEN {
        let distance = levenshtein(&guess, &canonical);
        let ratio = 1.0 - distance as f64 / longest as f64;
        if ratio >= EDIT_RATIO_THRESHOLD {
            return true;
        }
    }

    false
}

/// Check `guess` against a canonical answer and all of its aliases
pub fn matches_any<'a>(guess: &str, candidates: impl IntoIterator<Item = &'a str>) -> bool {
    candidates
        .into_iter()
        .any(|candidate| matches(guess, candidate))
}

/// Normalize text for comparison
pub fn normalize(input: &str) -> String {
    let mut folded = String::with_capacity(input.len());
    for c in input.chars().flat_map(char::to_lowercase) {
        match c {
            '\'' | '\u{2019}' | '`' => {}
            _ => match fold_diacritic(c) {
                Some(replacement) => folded.push_str(replacement),
                None if c.is_alphanumeric() => folded.push(c),
                None => folded.push(' '),
            },
        }
    }

    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    apply_synonyms(&collapsed)
}

fn apply_synonyms(text: &str) -> String {
    let mut padded = format!(" {} ", text);
    for (from, to) in SYNONYMS {
        let needle = format!(" {} ", from);
        let replacement = format!(" {} ", to);
        while padded.contains(&needle) {
            padded = padded.replace(&needle, &replacement);
        }
    }
    padded.trim().to_string()
}

fn fold_diacritic(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ł' | 'ľ' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ß' => "ss",
        'ť' | 'ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(folded)
}

fn token_jaccard(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;

    let left: HashSet<&str> = a.split(' ').collect();
    let right: HashSet<&str> = b.split(' ').collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonym_canonicalization() {
        assert!(matches("Father Christmas", "Santa"));
        assert!(matches("santa claus", "Santa"));
        assert!(matches("xmas tree", "christmas tree"));
    }

    #[test]
    fn test_unrelated_words_rejected() {
        assert!(!matches("giraffe", "santa"));
        assert!(!matches("tree", "snowman"));
        assert!(!matches("", "snowman"));
    }

    #[test]
    fn test_case_and_punctuation() {
        assert!(matches("snowman", "Snowman"));
        assert!(matches("  SNOW-MAN!! ", "snowman"));
        assert!(matches("Rudolph's nose", "rudolphs nose"));
    }

    #[test]
    fn test_diacritics_folded() {
        assert_eq!(normalize("Crème Brûlée"), "creme brulee");
        assert!(matches("Pere Noël", "santa"));
        assert!(matches("Straße", "strasse"));
    }

    #[test]
    fn test_substring_containment() {
        assert!(matches("tree", "christmas tree"));
        // too short to count as containment
        assert!(!matches("ch", "christmas tree"));
    }

    #[test]
    fn test_typos_accepted_for_short_strings() {
        assert!(matches("snowmann", "snowman"));
        assert!(matches("gingerbred", "gingerbread"));
        assert!(!matches("snowball", "snowman"));
    }

    #[test]
    fn test_token_jaccard_word_order() {
        assert!(matches("tree christmas decorated", "decorated christmas tree"));
    }

    #[test]
    fn test_matches_any_checks_aliases() {
        let candidates = ["Snowman", "Schneemann", "Bonhomme de neige"];
        assert!(matches_any("schneeman", candidates.iter().copied()));
        assert!(!matches_any("penguin", candidates.iter().copied()));
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
