use std::time::Duration;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::MatchOptions;
use crate::hamming::nearest_hamming;
use crate::index::ReferenceEntry;
use crate::orb::Descriptor;
use crate::utils::Deadline;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("匹配超时")]
    Timeout,
}

/// 没有找到匹配的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NoMatchReason {
    /// 查询图片的描述符数量不足
    TooFewDescriptors,
    /// 索引中没有任何参考图片
    EmptyIndex,
    /// 最高分低于确认阈值
    BelowThreshold,
}

impl NoMatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoMatchReason::TooFewDescriptors => "too_few_descriptors",
            NoMatchReason::EmptyIndex => "empty_index",
            NoMatchReason::BelowThreshold => "below_threshold",
        }
    }
}

/// 一次匹配的结果
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// 确认匹配的参考图片在索引中的位置
    pub best: Option<usize>,
    /// 最高分，即使没有确认匹配也会给出
    pub score: usize,
    pub reason: Option<NoMatchReason>,
}

impl MatchOutcome {
    fn rejected(score: usize, reason: NoMatchReason) -> Self {
        Self { best: None, score, reason: Some(reason) }
    }

    pub fn is_match(&self) -> bool {
        self.best.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Matcher {
    /// 对应点的最大汉明距离（不含），None 表示不限制
    pub max_distance: Option<u32>,
    pub min_good_matches: usize,
    pub min_query_descriptors: usize,
    /// 只保留互为最近邻的对应点
    pub cross_check: bool,
    pub parallel: bool,
    pub timeout: Option<Duration>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::from(&MatchOptions::default())
    }
}

impl From<&MatchOptions> for Matcher {
    fn from(opts: &MatchOptions) -> Self {
        Self {
            max_distance: opts.max_distance(),
            min_good_matches: opts.min_good_matches,
            min_query_descriptors: opts.min_query_descriptors,
            cross_check: !opts.no_cross_check,
            parallel: !opts.no_parallel,
            timeout: opts.timeout(),
        }
    }
}

impl Matcher {
    /// 在所有参考图片中寻找与查询描述符最匹配的一张
    ///
    /// 分数为合格对应点的数量。分数相同时保留索引中靠前的参考图片，
    /// 这是有意为之的先到先得规则，不存在第二排序条件
    pub fn best_match(
        &self,
        query: &[Descriptor],
        entries: &[ReferenceEntry],
    ) -> Result<MatchOutcome, MatchError> {
        if query.is_empty() || query.len() < self.min_query_descriptors {
            return Ok(MatchOutcome::rejected(0, NoMatchReason::TooFewDescriptors));
        }
        if entries.is_empty() {
            return Ok(MatchOutcome::rejected(0, NoMatchReason::EmptyIndex));
        }

        let scores = self.score_all(query, entries)?;

        let mut best = 0;
        let mut best_score = scores[0];
        for (i, &score) in scores.iter().enumerate().skip(1) {
            if score > best_score {
                best = i;
                best_score = score;
            }
        }

        // 没有任何对应点时不确认匹配，即使阈值为 0
        if best_score > 0 && best_score >= self.min_good_matches {
            Ok(MatchOutcome { best: Some(best), score: best_score, reason: None })
        } else {
            Ok(MatchOutcome::rejected(best_score, NoMatchReason::BelowThreshold))
        }
    }

    /// 计算查询描述符和每张参考图片的分数，顺序与 entries 一致
    pub fn score_all(
        &self,
        query: &[Descriptor],
        entries: &[ReferenceEntry],
    ) -> Result<Vec<usize>, MatchError> {
        let deadline = Deadline::after(self.timeout);
        let score = |entry: &ReferenceEntry| {
            if deadline.expired() {
                return Err(MatchError::Timeout);
            }
            Ok(self.count_good_matches(&entry.descriptors, query))
        };

        if self.parallel {
            entries.par_iter().map(score).collect()
        } else {
            entries.iter().map(score).collect()
        }
    }

    /// 统计两组描述符之间合格对应点的数量
    ///
    /// 每个参考描述符取距离最近的查询描述符，开启交叉验证时要求双方互为最近邻
    pub fn count_good_matches(&self, reference: &[Descriptor], query: &[Descriptor]) -> usize {
        if reference.is_empty() || query.is_empty() {
            return 0;
        }

        let backward: Vec<usize> = if self.cross_check {
            query
                .iter()
                .filter_map(|q| nearest_hamming(q, reference).map(|(idx, _)| idx))
                .collect()
        } else {
            vec![]
        };

        reference
            .iter()
            .enumerate()
            .filter(|(ridx, r)| {
                let Some((qidx, distance)) = nearest_hamming(r, query) else {
                    return false;
                };
                if self.max_distance.is_some_and(|max| distance >= max) {
                    return false;
                }
                !self.cross_check || backward[qidx] == *ridx
            })
            .count()
    }
}
