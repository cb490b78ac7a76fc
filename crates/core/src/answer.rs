use crate::PatientProfile;

pub const NO_RESULTS_ANSWER: &str =
    "抱歉，在当前知识库中没有找到相关的医疗建议。建议您咨询专业医生或提供更具体的问题。";
pub const LOW_RELEVANCE_ANSWER: &str =
    "抱歉，没有找到足够相关的医疗建议。建议您尝试其他关键词或咨询专业医生。";
pub const DISCLAIMER: &str = "**温馨提示**：以上内容仅供参考，具体治疗方案请以医生面诊为准。";

const EXTRACT_HEADER: &str = "根据相关文档：";
const EXTRACT_MAX_DOCS: usize = 5;
const EXTRACT_MAX_CHARS: usize = 200;
const MAX_SUGGESTIONS: usize = 5;

const PROMPT_TEMPLATE: &str = "你是一个专业的医疗助手。请基于以下参考文档回答用户的问题。

参考文档：
{context}

用户问题：{query}

请根据参考文档提供准确、专业的医疗建议。如果文档中没有相关信息，请诚实告知用户。
答案应该：
1. 结构清晰，易于理解
2. 基于提供的参考文档
3. 适当使用分级列表或要点
4. 包含具体的数值或建议
";

/// `[文档 n]` blocks separated by blank lines, followed by the patient line.
pub fn build_context(docs: &[String], patient: Option<&PatientProfile>) -> String {
    let mut context = docs
        .iter()
        .enumerate()
        .map(|(index, doc)| format!("[文档 {}]\n{doc}", index + 1))
        .collect::<Vec<_>>()
        .join("\n\n");

    if let Some(profile) = patient {
        context.push_str("\n\n");
        context.push_str(&profile.describe());
    }
    context
}

pub fn build_answer_prompt(query: &str, context: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{query}", query)
}

/// Answer assembled from the context itself, used when no generator is
/// configured or the generator call fails.
pub fn compose_extractive_answer(docs: &[String]) -> String {
    let mut parts = Vec::new();
    let mut seen: Vec<&str> = Vec::new();

    for doc in docs.iter().take(EXTRACT_MAX_DOCS) {
        let doc = doc.trim();
        if doc.is_empty() || seen.contains(&doc) {
            continue;
        }
        seen.push(doc);
        parts.push(format!("{}. {}", seen.len(), truncate_chars(doc, EXTRACT_MAX_CHARS)));
    }

    let mut answer = if parts.is_empty() {
        "抱歉，在当前知识库中没有找到相关的医疗建议。建议您咨询专业医生。".to_string()
    } else {
        format!("{EXTRACT_HEADER}\n\n{}", parts.join("\n\n"))
    };
    answer.push_str("\n\n\n\n");
    answer.push_str(DISCLAIMER);
    answer
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}...")
}

/// Follow-up questions for a few common conditions, keyed on query terms.
pub fn suggest_similar_queries(query: &str) -> Vec<String> {
    let table: &[(&str, &str, [&str; 3])] = &[
        ("饮食", "高血压", ["高血压吃什么", "高血压饮食禁忌", "高血压日常饮食"]),
        ("饮食", "糖尿病", ["糖尿病吃什么", "糖尿病饮食指南", "糖尿病饮食禁忌"]),
        ("症状|预防", "冠心病", ["冠心病早期表现", "冠心病怎么预防", "冠心病注意事项"]),
        ("症状|预防", "高血压", ["高血压早期症状", "高血压并发症", "高血压日常护理"]),
    ];

    let topic = if query.contains("饮食") {
        "饮食"
    } else if query.contains("症状") || query.contains("预防") {
        "症状|预防"
    } else {
        return Vec::new();
    };

    table
        .iter()
        .filter(|(entry_topic, _, _)| *entry_topic == topic)
        .find(|(_, condition, _)| query.contains(condition))
        .map(|(_, _, suggestions)| {
            suggestions
                .iter()
                .take(MAX_SUGGESTIONS)
                .map(|suggestion| suggestion.to_string())
                .collect()
        })
        .unwrap_or_default()
}
