//! 子序列模糊匹配与编辑距离
//!
//! 评分由三部分构成，权重为显式常量而不是散落的 magic numbers。

/// 匹配密度权重（匹配字符数 / 目标长度）
pub const DENSITY_WEIGHT: f64 = 0.4;
/// 连续段权重（段越少越长，得分越高）
pub const RUN_WEIGHT: f64 = 0.4;
/// 词边界起始加成
pub const BOUNDARY_BONUS: f64 = 0.2;

/// 一次成功的模糊匹配
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    /// 归一化分数，区间 (0, 1]
    pub score: f64,
    /// 目标串中被匹配的字符索引（升序）
    pub positions: Vec<usize>,
}

impl FuzzyMatch {
    /// 将相邻索引合并为半开区间 [start, end)，用于展示高亮
    pub fn ranges(&self) -> Vec<(usize, usize)> {
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for &pos in &self.positions {
            match ranges.last_mut() {
                Some((_, end)) if *end == pos => *end = pos + 1,
                _ => ranges.push((pos, pos + 1)),
            }
        }
        ranges
    }
}

fn lower(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// 子序列模糊匹配
///
/// 查询的每个字符必须按序出现在目标中（大小写不敏感），
/// 贪心取最左匹配以保证确定性。无有效子序列时返回 None。
pub fn fuzzy_match(query: &str, target: &str) -> Option<FuzzyMatch> {
    let query_chars: Vec<char> = query.chars().map(lower).collect();
    let target_chars: Vec<char> = target.chars().map(lower).collect();

    if query_chars.is_empty() || target_chars.is_empty() {
        return None;
    }

    let mut positions = Vec::with_capacity(query_chars.len());
    let mut cursor = 0;
    for &qc in &query_chars {
        let found = target_chars[cursor..]
            .iter()
            .position(|&tc| tc == qc)
            .map(|offset| cursor + offset)?;
        positions.push(found);
        cursor = found + 1;
    }

    // 连续段数：相邻索引断开一次多一段
    let runs = 1 + positions
        .windows(2)
        .filter(|pair| pair[1] != pair[0] + 1)
        .count();

    // 词边界：首个匹配位于目标开头或紧跟非字母数字字符
    let first = positions[0];
    let at_boundary = first == 0 || !target_chars[first - 1].is_alphanumeric();

    let density = positions.len() as f64 / target_chars.len() as f64;
    let run_score = 1.0 / runs as f64;
    let score = DENSITY_WEIGHT * density
        + RUN_WEIGHT * run_score
        + if at_boundary { BOUNDARY_BONUS } else { 0.0 };

    Some(FuzzyMatch { score, positions })
}

/// 标准 Levenshtein 编辑距离（插入/删除/替换代价均为 1）
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut previous: Vec<usize> = (0..=a_chars.len()).collect();
    let mut current = vec![0; a_chars.len() + 1];

    for (i, &bc) in b_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, &ac) in a_chars.iter().enumerate() {
            let substitution = previous[j] + usize::from(ac != bc);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[a_chars.len()]
}
