use serde::{Deserialize, Serialize};

/// One recognized word with its pixel bounding box and reading-order indices.
/// This is the wire format of the `<stem>_words.json` files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordRecord {
    /// `[left, top, right, bottom]` in image pixels.
    pub bbox: [i64; 4],
    pub text: String,
    pub block_num: i64,
    pub line_num: i64,
    pub span_num: i64,
}

/// A token as read from a words file. Ground-truth annotations may omit the
/// reading-order fields and use fractional coordinates.
#[derive(Debug, Clone, Deserialize)]
pub struct RawToken {
    pub bbox: [f64; 4],
    pub text: String,
    pub block_num: Option<i64>,
    pub line_num: Option<i64>,
    pub span_num: Option<i64>,
}

impl From<WordRecord> for RawToken {
    fn from(word: WordRecord) -> Self {
        Self {
            bbox: word.bbox.map(|value| value as f64),
            text: word.text,
            block_num: Some(word.block_num),
            line_num: Some(word.line_num),
            span_num: Some(word.span_num),
        }
    }
}

/// The two accepted shapes of a words file: a mapping wrapping the list under
/// a `words` key, or the bare list itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TokenFile {
    Wrapped { words: Vec<RawToken> },
    List(Vec<RawToken>),
}

/// A token after default-filling, ready to hand to the inference pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub bbox: [f64; 4],
    pub text: String,
    pub block_num: i64,
    pub line_num: i64,
    pub span_num: i64,
}

/// Fills missing reading-order fields once, at the boundary. Tokens without
/// an order are treated as a single block and line, in list order:
/// `span_num` defaults to the list position, `line_num` and `block_num` to 0.
pub fn normalize_tokens(file: TokenFile) -> Vec<Token> {
    let raw = match file {
        TokenFile::Wrapped { words } => words,
        TokenFile::List(list) => list,
    };

    raw.into_iter()
        .enumerate()
        .map(|(index, token)| Token {
            bbox: token.bbox,
            text: token.text,
            block_num: token.block_num.unwrap_or(0),
            line_num: token.line_num.unwrap_or(0),
            span_num: token.span_num.unwrap_or(index as i64),
        })
        .collect()
}

/// One detected region, as reported by the inference pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub score: f64,
    pub bbox: [f64; 4],
}

/// One table cell with its grid placement. `row_nums`/`column_nums` list
/// every grid slot the cell covers; spanning cells cover more than one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub bbox: [f64; 4],
    pub row_nums: Vec<usize>,
    pub column_nums: Vec<usize>,
    #[serde(default)]
    pub header: bool,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectOutput {
    pub objects: Vec<DetectedObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognizeOutput {
    pub objects: Vec<DetectedObject>,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

/// One detected table with its structure, from `extract` mode. Object and
/// cell coordinates are relative to the cropped table region.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedTable {
    /// Table bounds in page coordinates, before padding.
    pub bbox: [f64; 4],
    pub objects: Vec<DetectedObject>,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractOutput {
    pub tables: Vec<ExtractedTable>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_tokens_defaults_missing_order_fields() {
        let raw = r#"[
            {"bbox": [0.0, 0.0, 10.0, 5.0], "text": "alpha"},
            {"bbox": [12.0, 0.0, 20.0, 5.0], "text": "beta"},
            {"bbox": [22.0, 0.0, 30.0, 5.0], "text": "gamma"}
        ]"#;

        let file: TokenFile = serde_json::from_str(raw).unwrap();
        let tokens = normalize_tokens(file);

        assert_eq!(tokens.len(), 3);
        for (index, token) in tokens.iter().enumerate() {
            assert_eq!(token.span_num, index as i64);
            assert_eq!(token.line_num, 0);
            assert_eq!(token.block_num, 0);
        }
    }

    #[test]
    fn normalize_tokens_unwraps_words_mapping() {
        let raw = r#"{"words": [{"bbox": [1.0, 2.0, 3.0, 4.0], "text": "only"}]}"#;

        let file: TokenFile = serde_json::from_str(raw).unwrap();
        let tokens = normalize_tokens(file);

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "only");
        assert_eq!(tokens[0].span_num, 0);
    }

    #[test]
    fn normalize_tokens_keeps_supplied_order_fields() {
        let raw = r#"[{"bbox": [0.0, 0.0, 1.0, 1.0], "text": "w",
                       "block_num": 3, "line_num": 2, "span_num": 7}]"#;

        let file: TokenFile = serde_json::from_str(raw).unwrap();
        let tokens = normalize_tokens(file);

        assert_eq!(tokens[0].block_num, 3);
        assert_eq!(tokens[0].line_num, 2);
        assert_eq!(tokens[0].span_num, 7);
    }

    #[test]
    fn word_record_round_trips_through_raw_token() {
        let word = WordRecord {
            bbox: [5, 6, 25, 16],
            text: "cell".to_string(),
            block_num: 1,
            line_num: 2,
            span_num: 3,
        };

        let raw: RawToken = word.into();
        let tokens = normalize_tokens(TokenFile::List(vec![raw]));

        assert_eq!(tokens[0].bbox, [5.0, 6.0, 25.0, 16.0]);
        assert_eq!(tokens[0].span_num, 3);
    }
}
