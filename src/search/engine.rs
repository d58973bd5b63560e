//! 命令搜索引擎
//!
//! 对注册表中的候选命令逐字段做模糊匹配，加权汇总后叠加
//! 最近使用/高频使用加成，按分数降序返回确定性结果。

use std::sync::Arc;
use tracing::debug;

use crate::context::ExpressionEvaluator;
use crate::history::HistoryTracker;
use crate::registry::CommandRegistry;
use crate::search::matcher::fuzzy_match;
use crate::types::{
    now_millis, Command, CommandSearchOptions, CommandSearchResult, MatchField, SearchHighlights,
};

/// 逐字段权重：标题最高，其次关键字、分类、描述
const TITLE_WEIGHT: f64 = 10.0;
const KEYWORD_WEIGHT: f64 = 7.0;
const CATEGORY_WEIGHT: f64 = 5.0;
const DESCRIPTION_WEIGHT: f64 = 3.0;

/// 最近使用加成上限与时间窗口（24 小时内线性衰减）
const RECENCY_BOOST_MAX: f64 = 0.3;
const RECENCY_WINDOW_MS: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// 高频加成：每次使用 +0.01，封顶 0.3
const FREQUENCY_BOOST_PER_USE: f64 = 0.01;
const FREQUENCY_BOOST_MAX: f64 = 0.3;

/// 命令搜索引擎
pub struct SearchEngine {
    registry: Arc<CommandRegistry>,
    history: Arc<HistoryTracker>,
    evaluator: Arc<ExpressionEvaluator>,
}

impl SearchEngine {
    pub fn new(
        registry: Arc<CommandRegistry>,
        history: Arc<HistoryTracker>,
        evaluator: Arc<ExpressionEvaluator>,
    ) -> Self {
        Self {
            registry,
            history,
            evaluator,
        }
    }

    /// 搜索命令
    pub fn search_commands(&self, options: &CommandSearchOptions) -> Vec<CommandSearchResult> {
        let mut results = Vec::new();

        for command in self.registry.get_all_commands() {
            // 分类限定：有分类且不在限定列表内的候选剔除
            if let (Some(categories), Some(category)) = (&options.categories, &command.category) {
                if !categories.contains(category) {
                    continue;
                }
            }

            // when 表达式为假的命令视为禁用
            if !options.include_disabled {
                if let Some(when) = &command.when {
                    if !self.evaluator.evaluate(when).result {
                        continue;
                    }
                }
            }

            let Some(scored) = self.score_command(&command, &options.query) else {
                continue;
            };

            let mut score = scored.score;
            let last_used = self.history.get_last_used(&command.id);
            let frequency = self.history.get_command_frequency(&command.id);

            if options.prefer_recent {
                if let Some(last_used) = last_used {
                    let age = (now_millis() - last_used).max(0) as f64;
                    let boost = (1.0 - age / RECENCY_WINDOW_MS).max(0.0);
                    score *= 1.0 + boost * RECENCY_BOOST_MAX;
                }
            }

            if options.prefer_frequent && frequency > 0 {
                let boost = (frequency as f64 * FREQUENCY_BOOST_PER_USE).min(FREQUENCY_BOOST_MAX);
                score *= 1.0 + boost;
            }

            if score <= 0.0 || score < options.fuzzy_threshold {
                continue;
            }

            results.push(CommandSearchResult {
                command,
                score,
                matched_on: scored.matched_on,
                highlights: scored.highlights,
                recent_usage: last_used,
                frequency: (frequency > 0).then_some(frequency),
            });
        }

        // 分数降序，同分按标题字母序保证确定性
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.command.title.cmp(&b.command.title))
        });

        if let Some(limit) = options.limit {
            results.truncate(limit);
        }

        debug!(
            "命令搜索: query='{}', results={}",
            options.query,
            results.len()
        );
        results
    }

    /// 逐字段匹配并加权汇总；没有任何字段命中时返回 None
    fn score_command(&self, command: &Command, query: &str) -> Option<ScoredCommand> {
        let mut total = 0.0;
        let mut matched_on = Vec::new();
        let mut highlights = SearchHighlights::default();

        if let Some(m) = fuzzy_match(query, &command.title) {
            total += m.score * TITLE_WEIGHT;
            matched_on.push(MatchField::Title);
            highlights.title = m.ranges();
        }

        let best_keyword = command
            .keywords
            .iter()
            .filter_map(|keyword| fuzzy_match(query, keyword))
            .map(|m| m.score)
            .fold(None::<f64>, |best, score| {
                Some(best.map_or(score, |b| b.max(score)))
            });
        if let Some(score) = best_keyword {
            total += score * KEYWORD_WEIGHT;
            matched_on.push(MatchField::Keywords);
        }

        if let Some(m) = command
            .category
            .as_deref()
            .and_then(|category| fuzzy_match(query, category))
        {
            total += m.score * CATEGORY_WEIGHT;
            matched_on.push(MatchField::Category);
            highlights.category = m.ranges();
        }

        if let Some(m) = command
            .description
            .as_deref()
            .and_then(|description| fuzzy_match(query, description))
        {
            total += m.score * DESCRIPTION_WEIGHT;
            matched_on.push(MatchField::Description);
            highlights.description = m.ranges();
        }

        if matched_on.is_empty() {
            return None;
        }

        Some(ScoredCommand {
            score: total,
            matched_on,
            highlights,
        })
    }
}

struct ScoredCommand {
    score: f64,
    matched_on: Vec<MatchField>,
    highlights: SearchHighlights,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextStore;
    use crate::types::{sync_handler_fn, CommandContext, CommandResult};
    use serde_json::json;

    struct Fixture {
        registry: Arc<CommandRegistry>,
        history: Arc<HistoryTracker>,
        store: Arc<ContextStore>,
        engine: SearchEngine,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(CommandRegistry::new());
        let history = Arc::new(HistoryTracker::new());
        let store = Arc::new(ContextStore::new());
        let evaluator = Arc::new(ExpressionEvaluator::new(Arc::clone(&store)));
        let engine = SearchEngine::new(
            Arc::clone(&registry),
            Arc::clone(&history),
            evaluator,
        );
        Fixture {
            registry,
            history,
            store,
            engine,
        }
    }

    fn command(id: &str, title: &str) -> Command {
        Command::new(id, title, sync_handler_fn(|_| Ok(json!(null))))
    }

    fn record_use(history: &HistoryTracker, command_id: &str) {
        let timestamp = now_millis();
        history.record_execution(
            command_id,
            vec![],
            CommandContext::api(),
            CommandResult {
                command_id: command_id.to_string(),
                success: true,
                result: None,
                error: None,
                duration: 1,
                timestamp,
            },
        );
    }

    #[test]
    fn test_ranking_echo_above_exit() {
        let f = fixture();
        f.registry
            .register_command(command("echo", "Echo Text"))
            .unwrap();
        f.registry
            .register_command(command("exit", "Exit App"))
            .unwrap();

        let results = f
            .engine
            .search_commands(&CommandSearchOptions::new("ec"));
        assert_eq!(results.len(), 1, "'ec' 不是 'Exit App' 的子序列");
        assert_eq!(results[0].command.id, "echo");
        assert_eq!(results[0].matched_on, vec![MatchField::Title]);
        assert_eq!(results[0].highlights.title, vec![(0, 2)]);
    }

    #[test]
    fn test_deterministic_scores() {
        let f = fixture();
        f.registry
            .register_command(command("echo", "Echo Text"))
            .unwrap();

        let a = f.engine.search_commands(&CommandSearchOptions::new("ec"));
        let b = f.engine.search_commands(&CommandSearchOptions::new("ec"));
        assert_eq!(a[0].score, b[0].score);
    }

    #[test]
    fn test_keyword_and_category_matching() {
        let f = fixture();
        f.registry
            .register_command(
                command("file.open", "Open File")
                    .with_category("File")
                    .with_keywords(vec!["browse".to_string()]),
            )
            .unwrap();

        let by_keyword = f
            .engine
            .search_commands(&CommandSearchOptions::new("browse"));
        assert_eq!(by_keyword.len(), 1);
        assert!(by_keyword[0].matched_on.contains(&MatchField::Keywords));

        let by_category = f
            .engine
            .search_commands(&CommandSearchOptions::new("file"));
        assert!(by_category[0].matched_on.contains(&MatchField::Category));
    }

    #[test]
    fn test_category_filter() {
        let f = fixture();
        f.registry
            .register_command(command("view.zoom", "Zoom View").with_category("View"))
            .unwrap();
        f.registry
            .register_command(command("file.zoom", "Zoom File").with_category("File"))
            .unwrap();

        let results = f.engine.search_commands(
            &CommandSearchOptions::new("zoom").with_categories(vec!["View".to_string()]),
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].command.id, "view.zoom");
    }

    #[test]
    fn test_when_expression_filters_disabled() {
        let f = fixture();
        f.registry
            .register_command(command("gated", "Gated Command").with_when("editorFocus"))
            .unwrap();

        // editorFocus 未设置：命令被视为禁用
        assert!(f
            .engine
            .search_commands(&CommandSearchOptions::new("gated"))
            .is_empty());

        // include_disabled 时返回
        let mut options = CommandSearchOptions::new("gated");
        options.include_disabled = true;
        assert_eq!(f.engine.search_commands(&options).len(), 1);

        // 上下文满足后正常返回
        f.store.set_context("editorFocus", json!(true), None);
        assert_eq!(
            f.engine
                .search_commands(&CommandSearchOptions::new("gated"))
                .len(),
            1
        );
    }

    #[test]
    fn test_recency_boost() {
        let f = fixture();
        f.registry
            .register_command(command("alpha", "Zebra One"))
            .unwrap();
        f.registry
            .register_command(command("beta", "Zebra Two"))
            .unwrap();

        record_use(&f.history, "beta");

        // 无加成时同分，按标题排序 One 在前
        let plain = f.engine.search_commands(&CommandSearchOptions::new("zebra"));
        assert_eq!(plain[0].command.id, "alpha");

        // 开启最近使用加成后 beta 在前
        let boosted = f
            .engine
            .search_commands(&CommandSearchOptions::new("zebra").prefer_recent());
        assert_eq!(boosted[0].command.id, "beta");
        assert!(boosted[0].recent_usage.is_some());
    }

    #[test]
    fn test_frequency_boost() {
        let f = fixture();
        f.registry
            .register_command(command("rare", "Zebra One"))
            .unwrap();
        f.registry
            .register_command(command("often", "Zebra Two"))
            .unwrap();

        for _ in 0..5 {
            record_use(&f.history, "often");
        }

        let boosted = f
            .engine
            .search_commands(&CommandSearchOptions::new("zebra").prefer_frequent());
        assert_eq!(boosted[0].command.id, "often");
        assert_eq!(boosted[0].frequency, Some(5));
    }

    #[test]
    fn test_threshold_and_limit() {
        let f = fixture();
        f.registry
            .register_command(command("echo", "Echo Text"))
            .unwrap();
        f.registry
            .register_command(command("edit", "Edit Config"))
            .unwrap();

        let mut options = CommandSearchOptions::new("e");
        options.fuzzy_threshold = 1000.0;
        assert!(f.engine.search_commands(&options).is_empty());

        let limited = f
            .engine
            .search_commands(&CommandSearchOptions::new("e").with_limit(1));
        assert_eq!(limited.len(), 1);
    }
}
