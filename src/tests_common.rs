//! Key generators shared by tests and benchmarks.

/// Generate `count` distinct 4-byte keys by counting upwards in the last key
/// byte, carrying into earlier bytes.
///
/// Consecutive keys share long prefixes, so the nodes furthest from the root
/// fill up and grow first.
pub fn keys_counting_from_low_byte(count: u32) -> impl Iterator<Item = [u8; 4]> {
    (0..count).map(u32::to_be_bytes)
}

/// Generate `count` distinct 4-byte keys by counting upwards in the first
/// key byte, carrying into later bytes.
///
/// Consecutive keys diverge immediately, so the nodes near the root fill up
/// and grow first.
pub fn keys_counting_from_high_byte(count: u32) -> impl Iterator<Item = [u8; 4]> {
    (0..count).map(u32::to_le_bytes)
}

/// Generate a deterministic word list with heavy prefix sharing, in the
/// style of a natural-language dictionary.
///
/// All words are distinct and none contains a zero byte.
pub fn generated_dictionary() -> Vec<String> {
    const ONSETS: &[&str] = &[
        "b", "br", "c", "ch", "d", "f", "g", "gr", "h", "l", "m", "n", "p", "pr", "r", "s", "st",
        "t", "tr", "v",
    ];
    const VOWELS: &[&str] = &["a", "e", "i", "o", "u"];
    const CODAS: &[&str] = &["", "n", "r", "s", "st", "t"];

    let mut words = Vec::with_capacity(ONSETS.len() * VOWELS.len() * CODAS.len() * VOWELS.len());
    for onset in ONSETS {
        for vowel in VOWELS {
            for coda in CODAS {
                for ending in VOWELS {
                    let mut word = String::new();
                    word.push_str(onset);
                    word.push_str(vowel);
                    word.push_str(coda);
                    word.push_str(ending);
                    words.push(word);
                }
            }
        }
    }

    words
}
