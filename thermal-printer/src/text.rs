//! Text helpers for text-mode receipts
//!
//! Receipt printers in the field run without a Vietnamese code page, so text
//! is folded to plain ASCII by default. This module provides:
//! - Diacritic stripping and whitespace collapsing
//! - Column-width padding/truncation
//! - The receipt line layout (item + price on one line, centered totals)
//! - Encoding into the printer's byte representation

use std::sync::LazyLock;

use encoding_rs::Encoding;
use regex::Regex;
use tracing::instrument;

use crate::error::{PrintError, PrintResult};

/// Item price on one line: `2x25.000d = 50.000d`
static QTY_PRICE_TOTAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+x[\d.,]+d\s*=\s*[\d.,]+d$").expect("valid regex"));
/// Unit price line: `2x25.000d`
static QTY_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+x[\d.,]+d$").expect("valid regex"));
/// Line total continuation: `= 50.000d`
static LINE_TOTAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^=\s*[\d.,]+d$").expect("valid regex"));
/// Bare amount: `150.000d`
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\d.,]+d$").expect("valid regex"));
/// Order code: `#HD0042`
static ORDER_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#\w+$").expect("valid regex"));

/// Maximum columns an item name keeps when a price shares its line
const ITEM_NAME_COLUMNS: usize = 30;

/// Horizontal alignment of a printed line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

/// Character size of a printed line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextSize {
    #[default]
    Normal,
    /// 2x width and height
    Double,
    /// 3x width and height
    Large,
}

/// One styled line of a text-mode receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    pub text: String,
    pub align: Align,
    pub bold: bool,
    pub size: TextSize,
}

impl TextLine {
    /// Plain left-aligned line
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            align: Align::Left,
            bold: false,
            size: TextSize::Normal,
        }
    }

    /// Centered line
    pub fn centered(text: impl Into<String>) -> Self {
        Self {
            align: Align::Center,
            ..Self::plain(text)
        }
    }

    /// Centered, bold, double-size title
    pub fn title(text: impl Into<String>) -> Self {
        Self {
            align: Align::Center,
            bold: true,
            size: TextSize::Double,
            ..Self::plain(text)
        }
    }
}

/// How text becomes printer bytes
#[derive(Debug, Clone, Copy)]
pub enum TextCodec {
    /// Diacritics stripped, anything else outside ASCII printed as `?`
    Ascii,
    /// A single-byte code page the printer has selected
    CodePage(&'static Encoding),
}

impl TextCodec {
    /// Look up a code page by its WHATWG label (e.g. `windows-1258`)
    pub fn for_label(label: &str) -> PrintResult<Self> {
        Encoding::for_label(label.as_bytes())
            .map(TextCodec::CodePage)
            .ok_or_else(|| PrintError::InvalidConfig(format!("Unknown code page: {}", label)))
    }

    /// Encode a line of text
    pub fn encode(&self, s: &str) -> Vec<u8> {
        match self {
            TextCodec::Ascii => strip_diacritics(s)
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            TextCodec::CodePage(encoding) => {
                let (bytes, _, _) = encoding.encode(s);
                bytes.into_owned()
            }
        }
    }
}

/// Fold Vietnamese letters to their unaccented ASCII base
pub fn strip_diacritics(s: &str) -> String {
    s.chars().map(fold_char).collect()
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'ả' | 'ã' | 'ạ' | 'ă' | 'ắ' | 'ằ' | 'ẳ' | 'ẵ' | 'ặ' | 'â' | 'ấ' | 'ầ' | 'ẩ'
        | 'ẫ' | 'ậ' => 'a',
        'Á' | 'À' | 'Ả' | 'Ã' | 'Ạ' | 'Ă' | 'Ắ' | 'Ằ' | 'Ẳ' | 'Ẵ' | 'Ặ' | 'Â' | 'Ấ' | 'Ầ' | 'Ẩ'
        | 'Ẫ' | 'Ậ' => 'A',
        'é' | 'è' | 'ẻ' | 'ẽ' | 'ẹ' | 'ê' | 'ế' | 'ề' | 'ể' | 'ễ' | 'ệ' => 'e',
        'É' | 'È' | 'Ẻ' | 'Ẽ' | 'Ẹ' | 'Ê' | 'Ế' | 'Ề' | 'Ể' | 'Ễ' | 'Ệ' => 'E',
        'í' | 'ì' | 'ỉ' | 'ĩ' | 'ị' => 'i',
        'Í' | 'Ì' | 'Ỉ' | 'Ĩ' | 'Ị' => 'I',
        'ó' | 'ò' | 'ỏ' | 'õ' | 'ọ' | 'ô' | 'ố' | 'ồ' | 'ổ' | 'ỗ' | 'ộ' | 'ơ' | 'ớ' | 'ờ' | 'ở'
        | 'ỡ' | 'ợ' => 'o',
        'Ó' | 'Ò' | 'Ỏ' | 'Õ' | 'Ọ' | 'Ô' | 'Ố' | 'Ồ' | 'Ổ' | 'Ỗ' | 'Ộ' | 'Ơ' | 'Ớ' | 'Ờ' | 'Ở'
        | 'Ỡ' | 'Ợ' => 'O',
        'ú' | 'ù' | 'ủ' | 'ũ' | 'ụ' | 'ư' | 'ứ' | 'ừ' | 'ử' | 'ữ' | 'ự' => 'u',
        'Ú' | 'Ù' | 'Ủ' | 'Ũ' | 'Ụ' | 'Ư' | 'Ứ' | 'Ừ' | 'Ử' | 'Ữ' | 'Ự' => 'U',
        'ý' | 'ỳ' | 'ỷ' | 'ỹ' | 'ỵ' => 'y',
        'Ý' | 'Ỳ' | 'Ỷ' | 'Ỹ' | 'Ỵ' => 'Y',
        'đ' => 'd',
        'Đ' => 'D',
        other => other,
    }
}

/// Collapse runs of whitespace to one space and trim the ends
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate a string to at most `max` columns
pub fn truncate_columns(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Pad a string to exactly `width` columns, truncating if longer
pub fn pad_columns(s: &str, width: usize, align_right: bool) -> String {
    let current = s.chars().count();
    if current >= width {
        return truncate_columns(s, width);
    }
    let spaces = " ".repeat(width - current);
    if align_right {
        format!("{}{}", spaces, s)
    } else {
        format!("{}{}", s, spaces)
    }
}

/// Left text and right text on one line, at least one space apart
pub fn left_right(left: &str, right: &str, width: usize) -> String {
    let used = left.chars().count() + right.chars().count();
    let spaces = width.saturating_sub(used).max(1);
    format!("{}{}{}", left, " ".repeat(spaces), right)
}

/// Lay out plain receipt text as styled lines
///
/// Input is the text extracted from a receipt template, one element per
/// line. Blank lines are dropped. Headings are recognized with or without
/// diacritics; the lines keep their original spelling so a code page can
/// still print them.
#[instrument(skip(text), fields(len = text.len()))]
pub fn format_receipt(text: &str, width: usize) -> Vec<TextLine> {
    let lines: Vec<String> = text.lines().map(collapse_whitespace).collect();
    let folded: Vec<String> = lines.iter().map(|l| strip_diacritics(l)).collect();
    let at = |i: usize| lines.get(i).map(String::as_str).unwrap_or("");

    let mut result = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = &lines[i];
        let key = &folded[i];
        let next = at(i + 1);

        if line.is_empty() {
            i += 1;
            continue;
        }

        if QTY_PRICE_TOTAL.is_match(next) {
            result.push(TextLine::plain(item_line(line, next, width)));
            i += 2;
        } else if QTY_PRICE.is_match(next) {
            let after = at(i + 2);
            if LINE_TOTAL.is_match(after) {
                let price = format!("{} {}", next, after);
                result.push(TextLine::plain(item_line(line, &price, width)));
                i += 3;
            } else {
                result.push(TextLine::plain(item_line(line, next, width)));
                i += 2;
            }
        } else if key.eq_ignore_ascii_case("TONG CONG") {
            result.push(TextLine::centered(line.clone()));
            if AMOUNT.is_match(next) {
                result.push(TextLine::centered(next));
                i += 1;
            }
            i += 1;
        } else if key.eq_ignore_ascii_case("HOA DON BAN HANG") {
            result.push(TextLine::title(line.clone()));
            i += 1;
        } else if ORDER_CODE.is_match(line) {
            result.push(TextLine::centered(line.clone()));
            i += 1;
        } else {
            result.push(TextLine::plain(line.clone()));
            i += 1;
        }
    }

    result
}

fn item_line(name: &str, price: &str, width: usize) -> String {
    left_right(&truncate_columns(name, ITEM_NAME_COLUMNS), price, width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_diacritics() {
        assert_eq!(strip_diacritics("Hóa đơn bán hàng"), "Hoa don ban hang");
        assert_eq!(strip_diacritics("ĐẶNG Ữ"), "DANG U");
        assert_eq!(strip_diacritics("plain"), "plain");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \t b   c "), "a b c");
    }

    #[test]
    fn test_pad_columns() {
        assert_eq!(pad_columns("hi", 5, false), "hi   ");
        assert_eq!(pad_columns("hi", 5, true), "   hi");
        assert_eq!(pad_columns("hello world", 5, false), "hello");
    }

    #[test]
    fn test_left_right() {
        assert_eq!(left_right("a", "b", 5), "a   b");
        assert_eq!(left_right("abc", "def", 4), "abc def");
    }

    #[test]
    fn test_ascii_codec() {
        assert_eq!(TextCodec::Ascii.encode("Cà phê €"), b"Ca phe ?".to_vec());
    }

    #[test]
    fn test_code_page_codec() {
        let codec = TextCodec::for_label("windows-1258").unwrap();
        assert_eq!(codec.encode("abc"), b"abc".to_vec());
        assert!(TextCodec::for_label("no-such-page").is_err());
    }

    #[test]
    fn test_receipt_item_joined_with_price() {
        let lines = format_receipt("Bún bò Huế\n2x50.000d = 100.000d\n", 48);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text.chars().count(), 48);
        assert!(lines[0].text.starts_with("Bún bò Huế "));
        assert!(lines[0].text.ends_with("2x50.000d = 100.000d"));
    }

    #[test]
    fn test_receipt_split_price_lines() {
        let lines = format_receipt("Tra da\n1x5.000d\n= 5.000d", 48);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].text.ends_with("1x5.000d = 5.000d"));
    }

    #[test]
    fn test_receipt_long_name_truncated() {
        let name = "x".repeat(40);
        let lines = format_receipt(&format!("{}\n1x5.000d", name), 48);
        assert!(lines[0].text.starts_with(&"x".repeat(30)));
        assert!(!lines[0].text.starts_with(&"x".repeat(31)));
    }

    #[test]
    fn test_receipt_styles() {
        let text = "HÓA ĐƠN BÁN HÀNG\n#HD001\n\nTỔNG CỘNG\n150.000d\nCam on";
        let lines = format_receipt(text, 48);

        assert_eq!(lines[0], TextLine::title("HÓA ĐƠN BÁN HÀNG"));
        assert_eq!(lines[1], TextLine::centered("#HD001"));
        assert_eq!(lines[2], TextLine::centered("TỔNG CỘNG"));
        assert_eq!(lines[3], TextLine::centered("150.000d"));
        assert_eq!(lines[4], TextLine::plain("Cam on"));
        assert_eq!(lines.len(), 5);
    }
}
