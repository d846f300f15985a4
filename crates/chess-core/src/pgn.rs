//! PGN parsing utilities: a lightweight regex-based parser.

use std::sync::LazyLock;

use regex::Regex;

use crate::game_data::{GameMetadata, GameRecord};

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).expect("valid header regex"));
static STRIP_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("valid regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]*\}|;[^\n]*").expect("valid regex"));
static VARIATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^()]*\)").expect("valid regex"));
static MOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"O-O-O[+#]?|O-O[+#]?|[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?")
        .expect("valid move regex")
});

/// Parse a PGN string into a GameRecord. Returns None when no moves are found.
pub fn parse_pgn(pgn: &str) -> Option<GameRecord> {
    let mut metadata = GameMetadata {
        white: "Unknown".to_string(),
        black: "Unknown".to_string(),
        result: "*".to_string(),
        ..GameMetadata::default()
    };

    for cap in HEADER_RE.captures_iter(pgn) {
        let value = cap[2].to_string();
        match &cap[1] {
            "White" => metadata.white = value,
            "Black" => metadata.black = value,
            "Result" => metadata.result = value,
            "Date" => metadata.date = Some(value),
            "ECO" => metadata.eco = Some(value),
            "Opening" => metadata.opening = Some(value),
            "Event" => metadata.event = Some(value),
            "FEN" => metadata.fen = Some(value),
            _ => {}
        }
    }

    let moves = extract_moves(pgn);
    if moves.is_empty() {
        return None;
    }

    Some(GameRecord { metadata, moves })
}

/// Extract SAN moves from PGN text (after removing headers, comments, variations).
pub fn extract_moves(pgn: &str) -> Vec<String> {
    let no_headers = STRIP_HEADER_RE.replace_all(pgn, "");
    let mut text = COMMENT_RE.replace_all(&no_headers, "").into_owned();

    // Variations nest, so peel them from the inside out.
    while VARIATION_RE.is_match(&text) {
        text = VARIATION_RE.replace_all(&text, "").into_owned();
    }

    MOVE_RE
        .find_iter(&text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Extract a string value from a PGN header.
pub fn extract_header(pgn: &str, header_name: &str) -> Option<String> {
    HEADER_RE
        .captures_iter(pgn)
        .find(|cap| &cap[1] == header_name)
        .map(|cap| cap[2].to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pgn_basic() {
        let pgn = r#"[White "Player1"]
[Black "Player2"]
[Result "1-0"]
[Date "2025.01.15"]

1. e4 e5 2. Nf3 Nc6 1-0"#;

        let game = parse_pgn(pgn).unwrap();
        assert_eq!(game.metadata.white, "Player1");
        assert_eq!(game.metadata.black, "Player2");
        assert_eq!(game.metadata.result, "1-0");
        assert_eq!(game.moves, vec!["e4", "e5", "Nf3", "Nc6"]);
    }

    #[test]
    fn test_comments_and_nested_variations_removed() {
        let pgn = "1. e4 {best by test} e5 (1... c5 2. Nf3 (2. c3 d5) d6) 2. Nf3 ; line comment\n2... Nc6 3. O-O-O+ *";
        assert_eq!(extract_moves(pgn), vec!["e4", "e5", "Nf3", "Nc6", "O-O-O+"]);
    }

    #[test]
    fn test_promotion_and_mate_suffixes() {
        let moves = extract_moves("45. e8=Q+ Kd7 46. Qe7#");
        assert_eq!(moves, vec!["e8=Q+", "Kd7", "Qe7#"]);
    }

    #[test]
    fn test_empty_movetext() {
        assert!(parse_pgn("[White \"a\"]\n\n*").is_none());
    }

    #[test]
    fn test_extract_header() {
        let pgn = "[ECO \"C50\"]\n[Opening \"\"]";
        assert_eq!(extract_header(pgn, "ECO").as_deref(), Some("C50"));
        assert_eq!(extract_header(pgn, "Opening"), None);
        assert_eq!(extract_header(pgn, "Missing"), None);
    }
}
