//! Locale-tolerant collation keys and the `LOCALIZED` / `UNICODE` collations.
//!
//! Keys compare at primary strength: case, Latin diacritics, kana script
//! (hiragana vs katakana) and character width are ignored. A key is the UTF-8
//! encoding of the folded text followed by a single zero terminator, so the
//! key of a prefix is a prefix of the key of the whole string and hex keys can
//! be matched with `GLOB '<key>*'`.

use std::cmp::Ordering;

/// Name of the collation registered for locale-aware ordering.
pub const LOCALIZED: &str = "LOCALIZED";

/// Name of the collation registered for locale-independent Unicode ordering.
pub const UNICODE: &str = "UNICODE";

/// Half-width katakana U+FF66..=U+FF9D mapped to their full-width forms.
const HALF_WIDTH_KATAKANA: &str = "ヲァィゥェォャュョッーアイウエオカキクケコサシスセソタチツテトナニヌネノハヒフヘホマミムメモヤユヨラリルレロワン";

fn fold_latin(c: char) -> Option<&'static str> {
   let folded = match c {
      'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
      'æ' => "ae",
      'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => "c",
      'ď' | 'đ' | 'ð' => "d",
      'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => "e",
      'ĝ' | 'ğ' | 'ġ' | 'ģ' => "g",
      'ĥ' | 'ħ' => "h",
      'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => "i",
      'ĵ' => "j",
      'ķ' => "k",
      'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => "l",
      'ñ' | 'ń' | 'ņ' | 'ň' => "n",
      'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => "o",
      'œ' => "oe",
      'ŕ' | 'ŗ' | 'ř' => "r",
      'ś' | 'ŝ' | 'ş' | 'š' => "s",
      'ß' => "ss",
      'ţ' | 'ť' | 'ŧ' => "t",
      'þ' => "th",
      'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => "u",
      'ŵ' => "w",
      'ý' | 'ÿ' | 'ŷ' => "y",
      'ź' | 'ż' | 'ž' => "z",
      _ => return None,
   };
   Some(folded)
}

fn fold_char(c: char, out: &mut String) {
   for lower in c.to_lowercase() {
      match lower as u32 {
         // Full-width ASCII variants
         0xFF01..=0xFF5E => {
            if let Some(ascii) = char::from_u32(lower as u32 - 0xFEE0) {
               fold_char(ascii, out);
            }
         }
         0xFF66..=0xFF9D => {
            let index = (lower as u32 - 0xFF66) as usize;
            if let Some(kana) = HALF_WIDTH_KATAKANA.chars().nth(index) {
               out.push(kana);
            }
         }
         // Hiragana sort with the corresponding katakana
         0x3041..=0x3096 => out.push(char::from_u32(lower as u32 + 0x60).unwrap_or(lower)),
         _ => match fold_latin(lower) {
            Some(folded) => out.push_str(folded),
            None => out.push(lower),
         },
      }
   }
}

fn fold(text: &str) -> String {
   let mut out = String::with_capacity(text.len());
   for c in text.chars() {
      fold_char(c, &mut out);
   }
   out
}

/// Primary-strength collation key for `text`, zero terminated.
pub fn collation_key(text: &str) -> Vec<u8> {
   let mut key = fold(text).into_bytes();
   key.push(0);
   key
}

/// Lower-case hex rendering of [`collation_key`], without trailing zero bytes.
pub fn hex_collation_key(text: &str) -> String {
   let key = collation_key(text);
   let end = key.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
   hex::encode(&key[..end])
}

/// Orders by collation key, breaking ties on the raw text so that the
/// ordering is total.
pub fn localized_compare(a: &str, b: &str) -> Ordering {
   fold(a).cmp(&fold(b)).then_with(|| a.cmp(b))
}

/// Code point ordering, used for the `UNICODE` collation.
pub fn unicode_compare(a: &str, b: &str) -> Ordering {
   a.cmp(b)
}
