//! 题库匹配服务
//!
//! 给每个题库条目打一个非负分，丢弃非正分，取最高分且有题目文件的条目；
//! 都没有题目文件时退回最高分条目。同分按输入顺序（稳定排序）。

use tracing::debug;

use crate::models::ExamCatalogEntry;
use crate::services::selection_hints::SelectionHints;
use crate::utils::normalize::{normalize_label, similarity, tokenize_exam_type};

// ========== 权重 ==========

const UNIVERSITY_EXACT: f64 = 12.0;
const YEAR_IN_LABEL: f64 = 5.0;
const PREFERRED_TRACK: f64 = 4.0;
const SUBJECT_MATCH: f64 = 5.0;
const SUBJECT_HINT_MATCH: f64 = 3.0;
const CATEGORY_MATCH: f64 = 6.0;
const EXAM_MATCH: f64 = 6.0;
const COMBINED_MATCH: f64 = 8.0;
const TOKEN_MATCH: f64 = 5.0;
const ALL_TOKENS_BONUS: f64 = 5.0;
const HINT_TEXT_FLOOR: f64 = 0.45;
const HINT_TEXT_SCALE: f64 = 8.0;
const TRANSCRIPT_FLOOR: f64 = 0.4;
const TRANSCRIPT_SCALE: f64 = 5.0;

/// 题库匹配器
#[derive(Debug, Default, Clone, Copy)]
pub struct ExamCatalogMatcher;

impl ExamCatalogMatcher {
    /// 单个条目的得分
    pub fn score_entry(&self, entry: &ExamCatalogEntry, hints: &SelectionHints) -> f64 {
        let exam_type = entry.exam_type.as_str();
        let exam_type_norm = normalize_label(exam_type);
        let entry_tokens = tokenize_exam_type(exam_type);
        let mut score = 0.0;

        if hints.university.as_deref() == Some(entry.university.as_str()) {
            score += UNIVERSITY_EXACT;
        }

        if let Some(year_short) = hints.year_short.as_deref() {
            if exam_type.contains(year_short) {
                score += YEAR_IN_LABEL;
            }
        }

        if let Some(track) = hints.preferred_track.as_deref() {
            if exam_type.contains(track) {
                score += PREFERRED_TRACK;
            }
        }

        let contains = |needle: &str| !needle.is_empty() && exam_type_norm.contains(needle);
        if contains(&hints.subject_norm) {
            score += SUBJECT_MATCH;
        }
        if contains(&hints.subject_hint_norm) {
            score += SUBJECT_HINT_MATCH;
        }
        if contains(&hints.category_norm) {
            score += CATEGORY_MATCH;
        }
        if contains(&hints.exam_norm) {
            score += EXAM_MATCH;
        }
        if contains(&hints.combined_norm) {
            score += COMBINED_MATCH;
        }

        if !hints.hint_tokens.is_empty() {
            let matches = entry_tokens.intersection(&hints.hint_tokens).count();
            score += matches as f64 * TOKEN_MATCH;
            if matches > 0 && matches == entry_tokens.len() {
                score += ALL_TOKENS_BONUS;
            }
        }

        for text_norm in &hints.hint_text_norms {
            let ratio = similarity(&exam_type_norm, text_norm);
            if ratio > HINT_TEXT_FLOOR {
                score += ratio * HINT_TEXT_SCALE;
            }
        }

        if !hints.transcript_norm.is_empty() {
            let ratio = similarity(&exam_type_norm, &hints.transcript_norm);
            if ratio > TRANSCRIPT_FLOOR {
                score += ratio * TRANSCRIPT_SCALE;
            }
        }

        score
    }

    /// 所有正分条目，按分数降序（同分保持输入顺序）
    pub fn rank<'a>(
        &self,
        catalog: &'a [ExamCatalogEntry],
        hints: &SelectionHints,
    ) -> Vec<(f64, &'a ExamCatalogEntry)> {
        let mut scored: Vec<(f64, &ExamCatalogEntry)> = catalog
            .iter()
            .filter(|entry| !entry.exam_type.trim().is_empty())
            .map(|entry| (self.score_entry(entry, hints), entry))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        // sort_by 是稳定排序
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
    }

    /// 选出最佳条目
    pub fn select<'a>(
        &self,
        catalog: &'a [ExamCatalogEntry],
        hints: &SelectionHints,
    ) -> Option<&'a ExamCatalogEntry> {
        let scored = self.rank(catalog, hints);
        for (score, entry) in scored.iter().take(3) {
            debug!("候选 {}/{} 得分 {:.2}", entry.university, entry.exam_type, score);
        }

        scored
            .iter()
            .find(|(_, entry)| entry.has_assets())
            .or_else(|| scored.first())
            .map(|(_, entry)| *entry)
    }

    /// 按 `<yy>年<方向>` 直接查找条目（优先方向在前）
    pub fn direct_lookup<'a>(
        &self,
        catalog: &'a [ExamCatalogEntry],
        hints: &SelectionHints,
    ) -> Option<&'a ExamCatalogEntry> {
        let university = hints.university.as_deref()?;
        let year_short = hints.year_short.as_deref()?;

        let tracks: [&str; 2] = match hints.preferred_track.as_deref() {
            Some("文系") => ["文系", "理系"],
            _ => ["理系", "文系"],
        };

        tracks.iter().find_map(|track| {
            let label = format!("{}年{}", year_short, track);
            catalog.iter().find(|entry| {
                entry.university == university && entry.exam_type == label && entry.has_assets()
            })
        })
    }

    /// 识别步骤使用的完整解析：先直接查找，再打分
    pub fn resolve<'a>(
        &self,
        catalog: &'a [ExamCatalogEntry],
        hints: &SelectionHints,
    ) -> Option<&'a ExamCatalogEntry> {
        self.direct_lookup(catalog, hints)
            .or_else(|| self.select(catalog, hints))
    }
}
