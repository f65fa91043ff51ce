//! Vietnamese diacritic removal.
//!
//! Social-media text often drops tone marks entirely ("khong biet" for
//! "không biết"). Stripping accents from a share of the training inputs
//! teaches the normalizer to restore them.

use oorandom::Rand64;

use crate::sampling::sample_without_replacement;

const ACCENTED: &str = "ÁÀẢÃẠĂẮẰẲẴẶÂẤẦẨẪẬĐÈÉẺẼẸÊẾỀỂỄỆÍÌỈĨỊÓÒỎÕỌÔỐỒỔỖỘƠỚỜỞỠỢÚÙỦŨỤƯỨỪỬỮỰÝỲỶỸỴáàảãạăắằẳẵặâấầẩẫậđèéẻẽẹêếềểễệíìỉĩịóòỏõọôốồổỗộơớờởỡợúùủũụưứừửữựýỳỷỹỵ";
const PLAIN: &str = "AAAAAAAAAAAAAAAAADEEEEEEEEEEEIIIIIOOOOOOOOOOOOOOOOOUUUUUUUUUUUYYYYYaaaaaaaaaaaaaaaaadeeeeeeeeeeeiiiiiooooooooooooooooouuuuuuuuuuuyyyyy";

/// Maps a precomposed Vietnamese letter to its base letter.
#[must_use]
pub fn strip_accent(c: char) -> char {
    ACCENTED
        .chars()
        .position(|a| a == c)
        .and_then(|pos| PLAIN.chars().nth(pos))
        .unwrap_or(c)
}

/// Whether `c` carries a Vietnamese diacritic (including `đ`).
#[must_use]
pub fn has_accent(c: char) -> bool {
    ACCENTED.contains(c)
}

/// Removes every Vietnamese diacritic from `text`.
///
/// # Examples
/// ```
/// use visolex_core::accents::remove_accents;
///
/// assert_eq!(remove_accents("không biết Đà Nẵng"), "khong biet Da Nang");
/// ```
#[must_use]
pub fn remove_accents(text: &str) -> String {
    text.chars().map(strip_accent).collect()
}

/// Tone rows: the bare vowel, then grave, acute, hook, tilde and dot below.
const TONES: [[char; 6]; 12] = [
    ['a', 'à', 'á', 'ả', 'ã', 'ạ'],
    ['A', 'À', 'Á', 'Ả', 'Ã', 'Ạ'],
    ['e', 'è', 'é', 'ẻ', 'ẽ', 'ẹ'],
    ['E', 'È', 'É', 'Ẻ', 'Ẽ', 'Ẹ'],
    ['i', 'ì', 'í', 'ỉ', 'ĩ', 'ị'],
    ['I', 'Ì', 'Í', 'Ỉ', 'Ĩ', 'Ị'],
    ['o', 'ò', 'ó', 'ỏ', 'õ', 'ọ'],
    ['O', 'Ò', 'Ó', 'Ỏ', 'Õ', 'Ọ'],
    ['u', 'ù', 'ú', 'ủ', 'ũ', 'ụ'],
    ['U', 'Ù', 'Ú', 'Ủ', 'Ũ', 'Ụ'],
    ['y', 'ỳ', 'ý', 'ỷ', 'ỹ', 'ỵ'],
    ['Y', 'Ỳ', 'Ý', 'Ỷ', 'Ỹ', 'Ỵ'],
];

/// Open-syllable vowel pairs whose tone mark belongs on the first vowel.
const FIRST_VOWEL_PAIRS: [[char; 2]; 9] = [
    ['o', 'a'],
    ['o', 'e'],
    ['u', 'y'],
    ['a', 'i'],
    ['a', 'o'],
    ['a', 'u'],
    ['a', 'y'],
    ['o', 'i'],
    ['u', 'i'],
];

fn tone_of(c: char) -> Option<(usize, usize)> {
    TONES.iter().enumerate().find_map(|(row, tones)| {
        tones.iter().position(|&t| t == c).map(|tone| (row, tone))
    })
}

fn bare_lower(row: usize) -> char {
    TONES[row][0].to_ascii_lowercase()
}

/// Moves tone marks to their standard vowel in open syllables.
///
/// `hoà` becomes `hòa` and `caí` becomes `cái`. Syllables closed by a
/// consonant (`hoàng`, `ngoài`) and the `qu` cluster (`quý`) are left alone.
///
/// # Examples
/// ```
/// use visolex_core::accents::normalize_tone_marks;
///
/// assert_eq!(normalize_tone_marks("khoẻ không, hoà"), "khỏe không, hòa");
/// ```
#[must_use]
pub fn normalize_tone_marks(text: &str) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    for i in 0..chars.len().saturating_sub(1) {
        let (Some((first, 0)), Some((second, tone))) = (tone_of(chars[i]), tone_of(chars[i + 1]))
        else {
            continue;
        };
        let pair = [bare_lower(first), bare_lower(second)];
        let closed = chars.get(i + 2).is_some_and(|c| c.is_alphabetic());
        let after_q = i > 0 && matches!(chars[i - 1], 'q' | 'Q') && pair[0] == 'u';
        if tone == 0 || closed || after_q || !FIRST_VOWEL_PAIRS.contains(&pair) {
            continue;
        }
        chars[i] = TONES[first][tone];
        chars[i + 1] = TONES[second][0];
    }
    chars.into_iter().collect()
}

/// Removes diacritics from a random `ratio` share of the accented characters.
///
/// `ratio` is clamped to `[0, 1]`; the number of stripped characters is
/// rounded to the nearest integer.
pub fn remove_accents_ratio(text: &str, ratio: f32, rng: &mut Rand64) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    let accented: Vec<usize> = chars
        .iter()
        .enumerate()
        .filter(|(_, c)| has_accent(**c))
        .map(|(i, _)| i)
        .collect();
    let k = (ratio.clamp(0.0, 1.0) * accented.len() as f32).round() as usize;
    for pick in sample_without_replacement(accented.len(), k, rng) {
        let i = accented[pick];
        chars[i] = strip_accent(chars[i]);
    }
    chars.into_iter().collect()
}
