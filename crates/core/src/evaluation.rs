use crate::patterns::extract_json_object;
use crate::scorer::round_to;
use crate::traits::TextGenerator;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

pub const RATING_UNAVAILABLE: &str = "N/A";
pub const RATING_SCALE: [&str; 5] = ["优秀", "良好", "中等", "较差", "很差"];

const REPORT_RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    pub relevant_retrieved: Vec<String>,
    pub missed_docs: Vec<String>,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

/// Precision, recall and F1 with every denominator guarded.
///
/// Relevance is compared as sets, but the precision denominator counts
/// duplicate retrievals. `relevant_retrieved` follows retrieval order and
/// `missed_docs` follows ground-truth order.
pub fn calculate_metrics(retrieved: &[String], ground_truth: &[String]) -> RetrievalMetrics {
    let truth = dedup(ground_truth);
    let truth_set: HashSet<&str> = truth.iter().map(String::as_str).collect();
    let retrieved_set: HashSet<&str> = retrieved.iter().map(String::as_str).collect();

    let relevant_retrieved: Vec<String> = dedup(retrieved)
        .into_iter()
        .filter(|doc| truth_set.contains(doc.as_str()))
        .collect();
    let missed_docs: Vec<String> = truth
        .iter()
        .filter(|doc| !retrieved_set.contains(doc.as_str()))
        .cloned()
        .collect();

    let relevant = relevant_retrieved.len() as f64;
    let precision = ratio(relevant, retrieved.len());
    let recall = ratio(relevant, truth.len());
    let f1_score = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    RetrievalMetrics {
        relevant_retrieved,
        missed_docs,
        precision,
        recall,
        f1_score,
    }
}

fn ratio(numerator: f64, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

fn dedup(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(item.as_str()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiAudit {
    pub rating: String,
    pub comment: String,
    pub relevance_labels: BTreeMap<String, bool>,
}

impl AiAudit {
    pub fn unavailable(comment: impl Into<String>) -> Self {
        Self {
            rating: RATING_UNAVAILABLE.to_string(),
            comment: comment.into(),
            relevance_labels: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuditPayload {
    #[serde(default = "unavailable_rating")]
    rating: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    relevance_labels: BTreeMap<String, Value>,
}

fn unavailable_rating() -> String {
    RATING_UNAVAILABLE.to_string()
}

/// Reads the audit verdict out of free-form generator output.
pub fn parse_ai_response(response: &str) -> AiAudit {
    let Some(json) = extract_json_object(response) else {
        return AiAudit::unavailable("AI response did not contain a JSON object");
    };

    match serde_json::from_str::<AuditPayload>(json) {
        Ok(payload) => AiAudit {
            rating: payload.rating,
            comment: payload.comment,
            relevance_labels: payload
                .relevance_labels
                .into_iter()
                .filter_map(|(doc, label)| label.as_bool().map(|relevant| (doc, relevant)))
                .collect(),
        },
        Err(error) => {
            warn!(%error, "failed to parse AI audit response");
            AiAudit::unavailable(format!("failed to parse AI response: {error}"))
        }
    }
}

pub fn build_evaluation_prompt(query: &str, retrieved: &[String], ground_truth: &[String]) -> String {
    let mut prompt = format!(
        "你是一个专业的信息检索评估专家。请评估以下检索结果的质量。\n\n\
         **查询问题：**\n{query}\n\n\
         **检索到的文档（{} 个）：**\n",
        retrieved.len()
    );
    for (index, doc) in retrieved.iter().enumerate() {
        prompt.push_str(&format!("\n[文档 {}] {doc}\n", index + 1));
    }

    prompt.push_str(&format!("\n**真实相关文档（{} 个）：**\n", ground_truth.len()));
    for (index, doc) in ground_truth.iter().enumerate() {
        prompt.push_str(&format!("\n[文档 {}] {doc}\n", index + 1));
    }

    prompt.push_str(&format!(
        "\n请从以下几个维度进行评估：\n\n\
         1. **相关性标注**：对于每个检索到的文档，判断它是否与查询相关（true/false）\n\
         2. **总体评分**：根据检索质量给出评分（{}）\n\
         3. **详细评论**：说明评分理由，指出优点和不足\n\n\
         请按以下 JSON 格式输出（只返回 JSON，不要其他内容）：\n\
         {{\n  \"relevance_labels\": {{\n    \"文档 1\": true,\n    \"文档 2\": false\n  }},\n  \
         \"rating\": \"{}\",\n  \"comment\": \"详细评论内容...\"\n}}\n",
        RATING_SCALE.join("/"),
        RATING_SCALE[0],
    ));
    prompt
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub query: String,
    pub retrieved_docs: Vec<String>,
    pub ground_truth_docs: Vec<String>,
    pub relevant_retrieved: Vec<String>,
    pub missed_docs: Vec<String>,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub ai_rating: Option<String>,
    pub ai_comment: Option<String>,
    pub ai_relevance_labels: Option<BTreeMap<String, bool>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationCase {
    pub query: String,
    pub retrieved_docs: Vec<String>,
    pub ground_truth_docs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub query: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub ai_rating: Option<String>,
    pub ai_comment: Option<String>,
    pub relevant_count: usize,
    pub missed_count: usize,
}

impl From<&EvaluationResult> for CaseSummary {
    fn from(result: &EvaluationResult) -> Self {
        Self {
            query: result.query.clone(),
            precision: round_to(result.precision, 4),
            recall: round_to(result.recall, 4),
            f1_score: round_to(result.f1_score, 4),
            ai_rating: result.ai_rating.clone(),
            ai_comment: result.ai_comment.clone(),
            relevant_count: result.relevant_retrieved.len(),
            missed_count: result.missed_docs.len(),
        }
    }
}

/// Macro-averaged metrics over a list of cases, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEvaluation {
    pub total_cases: usize,
    pub average_precision: f64,
    pub average_recall: f64,
    pub average_f1_score: f64,
    pub detailed_results: Vec<CaseSummary>,
}

impl BatchEvaluation {
    pub fn summarize(results: &[EvaluationResult]) -> Self {
        let count = results.len();
        let mean = |metric: fn(&EvaluationResult) -> f64| {
            if count == 0 {
                0.0
            } else {
                round_to(results.iter().map(metric).sum::<f64>() / count as f64, 4)
            }
        };

        Self {
            total_cases: count,
            average_precision: mean(|result| result.precision),
            average_recall: mean(|result| result.recall),
            average_f1_score: mean(|result| result.f1_score),
            detailed_results: results.iter().map(CaseSummary::from).collect(),
        }
    }
}

/// Grades retrieval output, optionally asking a generator for a second
/// opinion on relevance.
#[derive(Clone, Default)]
pub struct Evaluator {
    generator: Option<Arc<dyn TextGenerator + Send + Sync>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self { generator: None }
    }

    pub fn with_generator(generator: Arc<dyn TextGenerator + Send + Sync>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    pub async fn evaluate(
        &self,
        query: &str,
        retrieved: &[String],
        ground_truth: &[String],
        use_ai_rating: bool,
    ) -> EvaluationResult {
        let metrics = calculate_metrics(retrieved, ground_truth);

        let audit = match (&self.generator, use_ai_rating) {
            (Some(generator), true) => {
                Some(self.audit(generator.as_ref(), query, retrieved, ground_truth).await)
            }
            _ => None,
        };

        let (ai_rating, ai_comment, ai_relevance_labels) = match audit {
            Some(audit) => (
                Some(audit.rating),
                Some(audit.comment),
                Some(audit.relevance_labels),
            ),
            None => (None, None, None),
        };

        EvaluationResult {
            query: query.to_string(),
            retrieved_docs: retrieved.to_vec(),
            ground_truth_docs: dedup(ground_truth),
            relevant_retrieved: metrics.relevant_retrieved,
            missed_docs: metrics.missed_docs,
            precision: metrics.precision,
            recall: metrics.recall,
            f1_score: metrics.f1_score,
            ai_rating,
            ai_comment,
            ai_relevance_labels,
        }
    }

    async fn audit(
        &self,
        generator: &(dyn TextGenerator + Send + Sync),
        query: &str,
        retrieved: &[String],
        ground_truth: &[String],
    ) -> AiAudit {
        let prompt = build_evaluation_prompt(query, retrieved, ground_truth);
        match generator.generate(&prompt).await {
            Ok(response) => parse_ai_response(&response),
            Err(error) => {
                warn!(%error, query, "AI audit generator call failed");
                AiAudit::unavailable(format!("AI evaluation failed: {error}"))
            }
        }
    }

    /// Evaluates every case concurrently; results keep the input order.
    pub async fn evaluate_cases(
        &self,
        cases: &[EvaluationCase],
        use_ai_rating: bool,
    ) -> Vec<EvaluationResult> {
        join_all(cases.iter().map(|case| {
            self.evaluate(
                &case.query,
                &case.retrieved_docs,
                &case.ground_truth_docs,
                use_ai_rating,
            )
        }))
        .await
    }

    pub async fn batch_evaluate(
        &self,
        cases: &[EvaluationCase],
        use_ai_rating: bool,
    ) -> BatchEvaluation {
        let results = self.evaluate_cases(cases, use_ai_rating).await;
        let batch = BatchEvaluation::summarize(&results);
        info!(
            total_cases = batch.total_cases,
            average_precision = batch.average_precision,
            average_recall = batch.average_recall,
            average_f1_score = batch.average_f1_score,
            "batch evaluation finished"
        );
        batch
    }
}

pub fn format_report(result: &EvaluationResult) -> String {
    let rule = "=".repeat(REPORT_RULE_WIDTH);
    let mut report = String::new();

    report.push_str(&format!("\n{rule}\nRetrieval Evaluation Report\n{rule}\n\n"));
    report.push_str(&format!("Query: {}\n\n", result.query));

    report.push_str("Retrieval counts:\n");
    report.push_str(&format!("- Retrieved documents: {}\n", result.retrieved_docs.len()));
    report.push_str(&format!(
        "- Ground-truth documents: {}\n",
        result.ground_truth_docs.len()
    ));
    report.push_str(&format!(
        "- Relevant retrieved: {}\n",
        result.relevant_retrieved.len()
    ));
    report.push_str(&format!("- Missed relevant documents: {}\n\n", result.missed_docs.len()));

    report.push_str("Metrics:\n");
    for (name, value) in [
        ("Precision", result.precision),
        ("Recall", result.recall),
        ("F1-Score", result.f1_score),
    ] {
        report.push_str(&format!("- {name}: {value:.4} ({:.2}%)\n", value * 100.0));
    }

    push_doc_list(&mut report, "Relevant retrieved documents", &result.relevant_retrieved);
    push_doc_list(&mut report, "Missed documents", &result.missed_docs);

    if let Some(rating) = &result.ai_rating {
        report.push_str("\nAI assessment:\n");
        report.push_str(&format!("- Rating: {rating}\n"));
        report.push_str(&format!(
            "- Comment: {}\n",
            result.ai_comment.as_deref().unwrap_or_default()
        ));

        if let Some(labels) = result.ai_relevance_labels.as_ref().filter(|labels| !labels.is_empty()) {
            report.push_str("\nAI relevance labels:\n");
            for (doc, relevant) in labels {
                let status = if *relevant { "relevant" } else { "not relevant" };
                report.push_str(&format!("  [{status}] {doc}\n"));
            }
        }
    }

    report.push_str(&format!("\n{rule}\n"));
    report
}

fn push_doc_list(report: &mut String, title: &str, docs: &[String]) {
    if docs.is_empty() {
        return;
    }
    report.push_str(&format!("\n{title}:\n"));
    for doc in docs {
        report.push_str(&format!("  - {doc}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GenerationError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedGenerator {
        response: String,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Err(GenerationError::Unavailable("model offline".to_string()))
        }
    }

    /// Finishes later the earlier its query appears in `delays`, and
    /// answers with the query name as the rating.
    struct StaggeredGenerator {
        delays: Vec<(&'static str, usize)>,
        finished: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl TextGenerator for StaggeredGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            let (name, yields) = self
                .delays
                .iter()
                .copied()
                .find(|(name, _)| prompt.contains(name))
                .ok_or_else(|| GenerationError::Unavailable("unknown query".to_string()))?;
            for _ in 0..yields {
                tokio::task::yield_now().await;
            }
            self.finished
                .lock()
                .map_err(|_| GenerationError::Unavailable("poisoned".to_string()))?
                .push(name);
            Ok(format!("{{\"rating\": \"{name}\", \"comment\": \"\"}}"))
        }
    }

    fn docs(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    fn approx(left: f64, right: f64) -> bool {
        (left - right).abs() < 1e-9
    }

    #[test]
    fn partial_overlap_metrics() {
        let metrics = calculate_metrics(&docs(&["d1", "d2", "d3"]), &docs(&["d2", "d4"]));
        assert_eq!(metrics.relevant_retrieved, docs(&["d2"]));
        assert_eq!(metrics.missed_docs, docs(&["d4"]));
        assert!(approx(metrics.precision, 1.0 / 3.0));
        assert_eq!(round_to(metrics.precision, 4), 0.3333);
        assert!(approx(metrics.recall, 0.5));
        assert!(approx(metrics.f1_score, 0.4));
    }

    #[test]
    fn empty_retrieval_scores_zero() {
        let metrics = calculate_metrics(&[], &docs(&["a"]));
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.recall, 0.0);
        assert_eq!(metrics.f1_score, 0.0);
        assert_eq!(metrics.missed_docs, docs(&["a"]));
    }

    #[test]
    fn empty_ground_truth_scores_zero() {
        let metrics = calculate_metrics(&docs(&["a", "b"]), &[]);
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.recall, 0.0);
        assert_eq!(metrics.f1_score, 0.0);
    }

    #[test]
    fn duplicates_count_in_precision_denominator_only() {
        let metrics = calculate_metrics(&docs(&["a", "a", "b", "c"]), &docs(&["a", "b"]));
        assert_eq!(metrics.relevant_retrieved, docs(&["a", "b"]));
        assert!(approx(metrics.precision, 0.5));
        assert!(approx(metrics.recall, 1.0));
    }

    #[test]
    fn counts_are_consistent_with_ratios() {
        let cases = [
            (docs(&["a", "b", "c", "d"]), docs(&["b", "d", "e"])),
            (docs(&["x"]), docs(&["x"])),
            (docs(&["p", "q", "r"]), docs(&["s", "t"])),
            (docs(&["k", "l", "m", "n", "o"]), docs(&["m"])),
        ];
        for (retrieved, truth) in cases {
            let metrics = calculate_metrics(&retrieved, &truth);
            let relevant = metrics.relevant_retrieved.len() as f64;
            assert!(approx(metrics.precision * retrieved.len() as f64, relevant));
            assert!(approx(metrics.recall * truth.len() as f64, relevant));
            assert!((0.0..=1.0).contains(&metrics.f1_score));
            assert_eq!(
                metrics.f1_score == 0.0,
                metrics.precision == 0.0 && metrics.recall == 0.0
            );
        }
    }

    #[test]
    fn ai_response_is_parsed_from_surrounding_text() {
        let audit = parse_ai_response(
            "好的，评估结果如下：\n{\"relevance_labels\": {\"文档 1\": true, \"文档 2\": false}, \"rating\": \"良好\", \"comment\": \"覆盖主要内容\"}\n以上。",
        );
        assert_eq!(audit.rating, "良好");
        assert_eq!(audit.comment, "覆盖主要内容");
        assert_eq!(audit.relevance_labels.get("文档 1"), Some(&true));
        assert_eq!(audit.relevance_labels.get("文档 2"), Some(&false));
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let audit = parse_ai_response("{\"comment\": \"只有评论\"}");
        assert_eq!(audit.rating, RATING_UNAVAILABLE);
        assert_eq!(audit.comment, "只有评论");
        assert!(audit.relevance_labels.is_empty());
    }

    #[test]
    fn non_json_response_degrades_to_sentinel() {
        let audit = parse_ai_response("抱歉，我无法评估。");
        assert_eq!(audit.rating, RATING_UNAVAILABLE);
        assert!(audit.relevance_labels.is_empty());
        assert!(!audit.comment.is_empty());
    }

    #[test]
    fn malformed_json_degrades_to_sentinel() {
        let audit = parse_ai_response("{\"rating\": \"优秀\", \"relevance_labels\": {\"文档 1\": tru}");
        assert_eq!(audit.rating, RATING_UNAVAILABLE);
        assert!(audit.relevance_labels.is_empty());
    }

    #[test]
    fn prompt_enumerates_every_document() {
        let prompt = build_evaluation_prompt(
            "高血压饮食",
            &docs(&["低盐饮食", "多吃蔬菜"]),
            &docs(&["低盐饮食"]),
        );
        assert!(prompt.contains("高血压饮食"));
        assert!(prompt.contains("检索到的文档（2 个）"));
        assert!(prompt.contains("[文档 2] 多吃蔬菜"));
        assert!(prompt.contains("真实相关文档（1 个）"));
        assert!(prompt.contains("relevance_labels"));
        assert!(prompt.contains("优秀/良好/中等/较差/很差"));
    }

    #[tokio::test]
    async fn evaluation_without_ai_leaves_ai_fields_empty() {
        let generator = Arc::new(ScriptedGenerator::new("{\"rating\": \"优秀\"}"));
        let evaluator = Evaluator::with_generator(generator.clone());
        let result = evaluator
            .evaluate("q", &docs(&["d1", "d2", "d3"]), &docs(&["d2", "d4"]), false)
            .await;

        assert_eq!(result.ai_rating, None);
        assert_eq!(result.ai_relevance_labels, None);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ai_audit_is_attached_when_requested() {
        let generator = Arc::new(ScriptedGenerator::new(
            "{\"relevance_labels\": {\"文档 1\": true}, \"rating\": \"中等\", \"comment\": \"一般\"}",
        ));
        let evaluator = Evaluator::with_generator(generator.clone());
        let result = evaluator
            .evaluate("q", &docs(&["d1"]), &docs(&["d1"]), true)
            .await;

        assert_eq!(result.ai_rating.as_deref(), Some("中等"));
        assert_eq!(result.ai_comment.as_deref(), Some("一般"));
        assert_eq!(
            result.ai_relevance_labels.and_then(|labels| labels.get("文档 1").copied()),
            Some(true)
        );
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_generator_does_not_touch_metrics() {
        let evaluator = Evaluator::with_generator(Arc::new(FailingGenerator));
        let result = evaluator
            .evaluate("q", &docs(&["d1", "d2", "d3"]), &docs(&["d2", "d4"]), true)
            .await;

        assert_eq!(result.ai_rating.as_deref(), Some(RATING_UNAVAILABLE));
        assert_eq!(result.ai_relevance_labels, Some(BTreeMap::new()));
        assert!(result
            .ai_comment
            .as_deref()
            .is_some_and(|comment| comment.contains("model offline")));
        assert!(approx(result.precision, 1.0 / 3.0));
        assert!(approx(result.recall, 0.5));
        assert!(approx(result.f1_score, 0.4));
    }

    #[tokio::test]
    async fn non_json_generator_output_keeps_metrics() {
        let evaluator = Evaluator::with_generator(Arc::new(ScriptedGenerator::new("评估完成")));
        let result = evaluator.evaluate("q", &[], &docs(&["a"]), true).await;

        assert_eq!(result.ai_rating.as_deref(), Some(RATING_UNAVAILABLE));
        assert_eq!(result.ai_relevance_labels, Some(BTreeMap::new()));
        assert_eq!(result.precision, 0.0);
        assert_eq!(result.recall, 0.0);
        assert_eq!(result.f1_score, 0.0);
    }

    #[tokio::test]
    async fn ai_requested_without_generator_is_skipped() {
        let evaluator = Evaluator::new();
        let result = evaluator.evaluate("q", &docs(&["a"]), &docs(&["a"]), true).await;
        assert_eq!(result.ai_rating, None);
        assert_eq!(result.f1_score, 1.0);
    }

    #[tokio::test]
    async fn batch_is_macro_averaged_in_input_order() {
        let cases = vec![
            EvaluationCase {
                query: "first".to_string(),
                retrieved_docs: docs(&["d1", "d2", "d3"]),
                ground_truth_docs: docs(&["d2", "d4"]),
            },
            EvaluationCase {
                query: "second".to_string(),
                retrieved_docs: docs(&["a"]),
                ground_truth_docs: docs(&["a"]),
            },
            EvaluationCase {
                query: "third".to_string(),
                retrieved_docs: Vec::new(),
                ground_truth_docs: docs(&["z"]),
            },
        ];

        let batch = Evaluator::new().batch_evaluate(&cases, false).await;
        assert_eq!(batch.total_cases, 3);
        assert_eq!(batch.average_precision, 0.4444);
        assert_eq!(batch.average_recall, 0.5);
        assert_eq!(batch.average_f1_score, 0.4667);

        let queries: Vec<&str> = batch
            .detailed_results
            .iter()
            .map(|summary| summary.query.as_str())
            .collect();
        assert_eq!(queries, vec!["first", "second", "third"]);
        assert_eq!(batch.detailed_results[0].precision, 0.3333);
        assert_eq!(batch.detailed_results[0].relevant_count, 1);
        assert_eq!(batch.detailed_results[0].missed_count, 1);
    }

    #[tokio::test]
    async fn batch_results_follow_input_order_when_cases_finish_out_of_order() {
        let generator = Arc::new(StaggeredGenerator {
            delays: vec![("slowest", 6), ("middle", 3), ("fastest", 0)],
            finished: Mutex::new(Vec::new()),
        });
        let evaluator = Evaluator::with_generator(generator.clone());
        let cases: Vec<EvaluationCase> = ["slowest", "middle", "fastest"]
            .into_iter()
            .map(|query| EvaluationCase {
                query: query.to_string(),
                retrieved_docs: docs(&["d1"]),
                ground_truth_docs: docs(&["d1"]),
            })
            .collect();

        let results = evaluator.evaluate_cases(&cases, true).await;

        let finished = generator.finished.lock().expect("lock").clone();
        assert_eq!(finished, vec!["fastest", "middle", "slowest"]);
        for (case, result) in cases.iter().zip(&results) {
            assert_eq!(result.query, case.query);
            assert_eq!(result.ai_rating.as_deref(), Some(case.query.as_str()));
        }
    }

    #[test]
    fn non_boolean_labels_are_dropped_without_losing_the_verdict() {
        let audit = parse_ai_response(
            "结果：{\"relevance_labels\": {\"文档 1\": \"true\", \"文档 2\": false}, \
             \"rating\": \"良好\", \"comment\": \"基本覆盖\"}",
        );
        assert_eq!(audit.rating, "良好");
        assert_eq!(audit.comment, "基本覆盖");
        assert_eq!(
            audit.relevance_labels,
            BTreeMap::from([("文档 2".to_string(), false)])
        );
    }

    #[tokio::test]
    async fn empty_batch_averages_to_zero() {
        let batch = Evaluator::new().batch_evaluate(&[], false).await;
        assert_eq!(batch.total_cases, 0);
        assert_eq!(batch.average_precision, 0.0);
        assert!(batch.detailed_results.is_empty());
    }

    #[tokio::test]
    async fn report_contains_every_section() {
        let evaluator = Evaluator::with_generator(Arc::new(ScriptedGenerator::new(
            "{\"relevance_labels\": {\"文档 1\": false}, \"rating\": \"较差\", \"comment\": \"偏题\"}",
        )));
        let result = evaluator
            .evaluate("高血压饮食", &docs(&["d1", "d2", "d3"]), &docs(&["d2", "d4"]), true)
            .await;
        let report = format_report(&result);

        assert!(report.contains("Query: 高血压饮食"));
        assert!(report.contains("- Retrieved documents: 3"));
        assert!(report.contains("- Ground-truth documents: 2"));
        assert!(report.contains("- Relevant retrieved: 1"));
        assert!(report.contains("- Missed relevant documents: 1"));
        assert!(report.contains("- Precision: 0.3333 (33.33%)"));
        assert!(report.contains("- Recall: 0.5000 (50.00%)"));
        assert!(report.contains("- F1-Score: 0.4000 (40.00%)"));
        assert!(report.contains("- Rating: 较差"));
        assert!(report.contains("- Comment: 偏题"));
        assert!(report.contains("[not relevant] 文档 1"));
    }

    #[test]
    fn report_without_ai_has_no_ai_section() {
        let metrics = calculate_metrics(&docs(&["a"]), &docs(&["a"]));
        let result = EvaluationResult {
            query: "q".to_string(),
            retrieved_docs: docs(&["a"]),
            ground_truth_docs: docs(&["a"]),
            relevant_retrieved: metrics.relevant_retrieved,
            missed_docs: metrics.missed_docs,
            precision: metrics.precision,
            recall: metrics.recall,
            f1_score: metrics.f1_score,
            ai_rating: None,
            ai_comment: None,
            ai_relevance_labels: None,
        };
        let report = format_report(&result);
        assert!(report.contains("- F1-Score: 1.0000 (100.00%)"));
        assert!(!report.contains("AI assessment"));
    }
}
