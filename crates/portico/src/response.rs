//! # レスポンス種別
//!
//! ルートが返す本文の種別と、OpenAPI に載せる追加レスポンスの定義。

use serde::{Deserialize, Serialize};

/// レスポンス本文の種別
///
/// OpenAPI の `content` のメディアタイプを決める。
/// ハンドラが実際に返す型は axum 側で決まるため、ここでは記述のみを担う。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResponseType {
    #[default]
    Json,
    Html,
    PlainText,
}

impl ResponseType {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Html => "text/html",
            Self::PlainText => "text/plain",
        }
    }
}

/// 追加レスポンスの定義
///
/// `content_type` が `None` の場合、本文なしのレスポンスとして記述される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSpec {
    pub description:  String,
    pub content_type: Option<ResponseType>,
}

impl ResponseSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description:  description.into(),
            content_type: None,
        }
    }

    pub fn with_content(mut self, content_type: ResponseType) -> Self {
        self.content_type = Some(content_type);
        self
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ResponseType::Json, "application/json")]
    #[case(ResponseType::Html, "text/html")]
    #[case(ResponseType::PlainText, "text/plain")]
    fn test_content_typeがメディアタイプを返す(
        #[case] response_type: ResponseType,
        #[case] expected: &str,
    ) {
        assert_eq!(response_type.content_type(), expected);
    }

    #[test]
    fn test_文字列との相互変換() {
        assert_eq!(ResponseType::PlainText.to_string(), "plain_text");
        assert_eq!(ResponseType::from_str("html").unwrap(), ResponseType::Html);
        assert!(ResponseType::from_str("xml").is_err());
    }

    #[test]
    fn test_デフォルトはjson() {
        assert_eq!(ResponseType::default(), ResponseType::Json);
    }
}
