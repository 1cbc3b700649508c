//! 结构化输出解析
//!
//! 服务按要求返回 JSON（字符串数组或计划对象），可能被 ```json 代码块包裹或前后带说明文字。
//! 只做定位与反序列化，不做修复；失败即 MalformedOutput。

use serde::de::DeserializeOwned;

use crate::core::ResearchError;

/// 剥离 ``` 代码块（含语言标记），无代码块时返回去除首尾空白的原文
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let rest = &trimmed[start + 3..];
    // 跳过语言标记（json / JSON 等），直到换行
    let rest = match rest.find('\n') {
        Some(nl) if !rest[..nl].contains(&['[', '{'][..]) => &rest[nl + 1..],
        _ => rest,
    };
    rest.find("```").map(|end| &rest[..end]).unwrap_or(rest)
}

/// 定位并反序列化 JSON 值：剥离代码块后，从每个 open 字符处依次尝试，取第一个能完整解析的值。
/// 值之后的说明文字忽略；说明文字中的 `[5]` 之类片段解析失败后继续向后尝试。
pub fn parse_json_block<T: DeserializeOwned>(
    text: &str,
    open: char,
    step: &'static str,
) -> Result<T, ResearchError> {
    let body = strip_fence(text);
    let mut last_err = None;
    for (start, _) in body.match_indices(open) {
        let mut values = serde_json::Deserializer::from_str(&body[start..]).into_iter::<T>();
        match values.next() {
            Some(Ok(value)) => return Ok(value),
            Some(Err(e)) => last_err = Some(e),
            None => {}
        }
    }
    Err(match last_err {
        Some(e) => ResearchError::malformed(step, format!("{}: {}", e, body)),
        None => ResearchError::malformed(step, format!("no JSON {} in: {}", open, body)),
    })
}

/// 解析字符串数组（澄清问题、扩展查询）；去除首尾空白并丢弃空项，结果为空视为格式错误
pub fn parse_string_list(text: &str, step: &'static str) -> Result<Vec<String>, ResearchError> {
    let items: Vec<String> = parse_json_block(text, '[', step)?;

    let items: Vec<String> = items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if items.is_empty() {
        return Err(ResearchError::malformed(step, "empty list"));
    }
    Ok(items)
}
