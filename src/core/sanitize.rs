//! 用户输入清理

use serde_json::Value;

/// 去掉 `<...>` 标签并裁剪首尾空白，未闭合的 `<` 原样保留
pub fn sanitize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('<') {
        match rest[start..].find('>') {
            Some(len) => {
                out.push_str(&rest[..start]);
                rest = &rest[start + len + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// 只接受 http/https 绝对地址，其余返回空串
///
/// 通过校验后返回清理后的原文，不做规范化。
pub fn sanitize_url(input: &str) -> String {
    let clean = sanitize_text(input);
    if clean.is_empty() {
        return String::new();
    }
    match url::Url::parse(&clean) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => clean,
        _ => String::new(),
    }
}

pub fn sanitize_string_array(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| sanitize_text(s))
        .filter(|s| !s.is_empty())
        .collect()
}

/// 把存储中的列表字段统一成字符串列表
///
/// 数组逐项转成字符串，字符串按逗号拆分，其他类型视为空。
pub fn to_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => split_list(s),
        _ => Vec::new(),
    }
}

/// 解析表单里的列表输入，JSON 数组或逗号分隔文本
pub fn parse_list(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value @ Value::Array(_)) => to_list(&value),
        _ => split_list(raw),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
