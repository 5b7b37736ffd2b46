//! Document-type classification, per-type boosts, and quota selection.
//!
//! Quotas stop one document type (usually source code) from crowding out
//! everything else: twenty-five near-identical code chunks must not bury
//! the single README paragraph that answers the question.
//!
//! # Selection
//!
//! 1. Deduplicate by id (first occurrence wins).
//! 2. Seed: admit the best candidate of every bucket present whose quota is
//!    not zero, best bucket first, while fewer than `k` are admitted.
//! 3. Walk the boosted ranking in order, admitting a candidate only while
//!    its bucket is under quota, until `k` are admitted.
//! 4. Backfill: if fewer than `k` were admitted and candidates remain,
//!    admit the highest-scoring remaining ones regardless of quota.
//!
//! The admitted set is returned in boosted-score order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::fusion::FusedCandidate;
use crate::models::{DocumentType, Fragment};
use crate::params::RetrievalParams;

/// Tie-break order when two types score equally.
pub const PRIORITY: [DocumentType; 5] = [
    DocumentType::ReadmeOverview,
    DocumentType::ApiExamples,
    DocumentType::Paper,
    DocumentType::Metadata,
    DocumentType::Code,
];

/// Per-pattern hit cap so one repetitive fragment can't dominate.
const MAX_HITS: usize = 5;

const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "kt", "c", "h", "cc", "cpp", "hpp", "cs",
    "rb", "php", "swift", "scala", "sh", "lua", "sql", "zig",
];
const METADATA_EXTENSIONS: &[&str] = &["toml", "json", "yaml", "yml", "lock", "ini", "cfg"];
const METADATA_FILES: &[&str] = &[
    "cargo.toml", "package.json", "pyproject.toml", "setup.py", "setup.cfg", "go.mod",
    "requirements.txt", "license", "license.md", "changelog", "changelog.md", ".gitignore",
];
const EXAMPLE_SEGMENTS: &[&str] = &["examples", "example", "demo", "demos", "samples", "tutorial", "tutorials"];
const PAPER_SEGMENTS: &[&str] = &["papers", "paper", "arxiv", "publications"];
const OVERVIEW_STEMS: &[&str] = &["overview", "introduction", "intro", "getting-started", "getting_started", "index"];

static OVERVIEW_HEADING: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?im)^#{1,3}\s*(overview|introduction|getting started|installation|quick ?start|about)\b").ok()
});
static PROJECT_INTRO: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\bthis (project|library|repository|crate|package|tool) (is|provides)\b").ok()
});
static EXAMPLE_CUE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(example|usage|sample)\s*:").ok());
static SHELL_PROMPT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(\$ |>>> |curl )").ok());
static CODE_FENCE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?m)^```").ok());
static CODE_DECL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(pub\s+)?(fn|def|class|struct|impl|enum|interface|func|function|import|#include|package|use)\b").ok()
});
static CODE_LINE_END: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?m)[;{]\s*$").ok());
static PAPER_CUE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(abstract|et al\.|arxiv|doi:|proceedings|we propose|in this paper|related work)").ok()
});
static METADATA_KEY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?im)^\s*"?(version|license|authors?|name|dependencies|edition)"?\s*[:=]"#).ok()
});

fn hits(pattern: &LazyLock<Option<Regex>>, text: &str) -> u32 {
    pattern
        .as_ref()
        .map_or(0, |re| re.find_iter(text).take(MAX_HITS).count() as u32)
}

/// Lowercased location pieces derived from `repo` and `path`.
struct Location {
    segments: Vec<String>,
    file_name: String,
    stem: String,
    extension: String,
}

impl Location {
    fn parse(repo: Option<&str>, path: Option<&str>) -> Self {
        let joined = [repo.unwrap_or(""), path.unwrap_or("")]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/")
            .to_lowercase();
        let segments: Vec<String> = joined
            .split(['/', '\\'])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let file_name = if path.is_some() {
            segments.last().cloned().unwrap_or_default()
        } else {
            String::new()
        };
        let stem = file_name.split('.').next().unwrap_or("").to_string();
        let extension = match file_name.rsplit_once('.') {
            Some((head, ext)) if !head.is_empty() => ext.to_string(),
            _ => String::new(),
        };
        Self {
            segments,
            file_name,
            stem,
            extension,
        }
    }

    fn has_segment(&self, names: &[&str]) -> bool {
        self.segments.iter().any(|s| names.contains(&s.as_str()))
    }
}

/// Heuristic score for every candidate type (excluding the
/// `documentation` default).
pub fn type_scores(repo: Option<&str>, path: Option<&str>, text: &str) -> [(DocumentType, u32); 5] {
    let loc = Location::parse(repo, path);

    let mut readme = hits(&OVERVIEW_HEADING, text) * 2 + hits(&PROJECT_INTRO, text);
    if loc.stem.starts_with("readme") {
        readme += 3;
    } else if OVERVIEW_STEMS.contains(&loc.stem.as_str()) {
        readme += 2;
    }

    let mut examples = hits(&EXAMPLE_CUE, text) + hits(&SHELL_PROMPT, text) + hits(&CODE_FENCE, text) / 2;
    if loc.has_segment(EXAMPLE_SEGMENTS) || loc.stem.contains("example") || loc.stem.contains("usage") {
        examples += 3;
    } else if loc.has_segment(&["api"]) {
        examples += 1;
    }

    let mut paper = hits(&PAPER_CUE, text);
    if loc.extension == "pdf" || loc.has_segment(PAPER_SEGMENTS) {
        paper += 3;
    }

    let mut metadata = hits(&METADATA_KEY, text);
    if METADATA_FILES.contains(&loc.file_name.as_str())
        || METADATA_EXTENSIONS.contains(&loc.extension.as_str())
    {
        metadata += 3;
    }

    let mut code = hits(&CODE_DECL, text) + hits(&CODE_LINE_END, text) / 2;
    if CODE_EXTENSIONS.contains(&loc.extension.as_str()) {
        code += 3;
    }

    [
        (DocumentType::ReadmeOverview, readme),
        (DocumentType::ApiExamples, examples),
        (DocumentType::Paper, paper),
        (DocumentType::Metadata, metadata),
        (DocumentType::Code, code),
    ]
}

/// Classify a fragment. An explicit `doc_type` tag wins; otherwise the
/// highest heuristic score wins with ties broken by [`PRIORITY`], and
/// `documentation` is the default when nothing scores above zero.
pub fn classify(fragment: &Fragment) -> DocumentType {
    if let Some(explicit) = fragment.doc_type {
        return explicit;
    }
    let scores = type_scores(fragment.repo.as_deref(), fragment.path.as_deref(), &fragment.text);
    let mut best = (DocumentType::Documentation, 0u32);
    // `scores` is already in priority order; strict `>` keeps the earlier type on ties.
    for (doc_type, score) in scores {
        if score > best.1 {
            best = (doc_type, score);
        }
    }
    best.0
}

/// A fused candidate with its document type and boost applied.
#[derive(Debug, Clone)]
pub struct BoostedCandidate {
    pub candidate: FusedCandidate,
    pub doc_type: DocumentType,
    pub boost: f64,
    /// `fused_score + boost`.
    pub score: f64,
}

/// Classify every candidate, add its type boost once, and re-sort by
/// boosted score (desc), salience (desc), id (asc).
pub fn apply_boosts(candidates: Vec<FusedCandidate>, params: &RetrievalParams) -> Vec<BoostedCandidate> {
    let mut boosted: Vec<BoostedCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let doc_type = classify(&candidate.fragment);
            let boost = params.weight_for(doc_type);
            BoostedCandidate {
                score: candidate.fused_score + boost,
                candidate,
                doc_type,
                boost,
            }
        })
        .collect();

    boosted.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.candidate
                    .fragment
                    .salience
                    .partial_cmp(&a.candidate.fragment.salience)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.candidate.fragment.id.cmp(&b.candidate.fragment.id))
    });
    boosted
}

/// Output of [`select_with_quotas`].
#[derive(Debug, Clone, Default)]
pub struct QuotaSelection {
    pub admitted: Vec<BoostedCandidate>,
    /// True if quota-exempt backfill was needed to reach `k`.
    pub backfilled: bool,
}

impl QuotaSelection {
    pub fn count_of(&self, doc_type: DocumentType) -> usize {
        self.admitted.iter().filter(|c| c.doc_type == doc_type).count()
    }
}

/// Enforce per-bucket quotas over a boosted ranking (see module docs).
///
/// Buckets missing from `quotas` are unlimited.
pub fn select_with_quotas(
    ranked: &[BoostedCandidate],
    k: usize,
    quotas: &BTreeMap<DocumentType, usize>,
) -> QuotaSelection {
    let mut seen: HashSet<&str> = HashSet::new();
    let unique: Vec<usize> = (0..ranked.len())
        .filter(|&i| seen.insert(ranked[i].candidate.fragment.id.as_str()))
        .collect();

    let under_quota = |doc_type: DocumentType, counts: &HashMap<DocumentType, usize>| {
        let used = counts.get(&doc_type).copied().unwrap_or(0);
        quotas.get(&doc_type).map_or(true, |&q| used < q)
    };

    let mut admitted: Vec<usize> = Vec::with_capacity(k);
    let mut taken: HashSet<usize> = HashSet::new();
    let mut counts: HashMap<DocumentType, usize> = HashMap::new();

    // Seed one per bucket, best bucket first.
    let mut seeded_types: HashSet<DocumentType> = HashSet::new();
    for &i in &unique {
        if admitted.len() >= k {
            break;
        }
        let doc_type = ranked[i].doc_type;
        if !seeded_types.insert(doc_type) || !under_quota(doc_type, &counts) {
            continue;
        }
        admitted.push(i);
        taken.insert(i);
        *counts.entry(doc_type).or_insert(0) += 1;
    }

    for &i in &unique {
        if admitted.len() >= k {
            break;
        }
        if taken.contains(&i) {
            continue;
        }
        let doc_type = ranked[i].doc_type;
        if under_quota(doc_type, &counts) {
            admitted.push(i);
            taken.insert(i);
            *counts.entry(doc_type).or_insert(0) += 1;
        }
    }

    let mut backfilled = false;
    if admitted.len() < k {
        for &i in &unique {
            if admitted.len() >= k {
                break;
            }
            if taken.insert(i) {
                admitted.push(i);
                backfilled = true;
            }
        }
    }

    admitted.sort_unstable();
    debug!(
        admitted = admitted.len(),
        backfilled,
        candidates = unique.len(),
        "quota selection"
    );

    QuotaSelection {
        admitted: admitted.into_iter().map(|i| ranked[i].clone()).collect(),
        backfilled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provenance;
    use std::sync::Arc;

    fn candidate(fragment: Fragment, fused: f64) -> FusedCandidate {
        FusedCandidate {
            fragment: Arc::new(fragment),
            rrf_score: fused,
            fused_score: fused,
            provenance: Provenance::Hybrid,
            lexical_rank: Some(0),
            vector_rank: Some(0),
        }
    }

    #[test]
    fn test_classifier_patterns_compile() {
        for (name, pattern) in [
            ("overview_heading", &OVERVIEW_HEADING),
            ("project_intro", &PROJECT_INTRO),
            ("example_cue", &EXAMPLE_CUE),
            ("shell_prompt", &SHELL_PROMPT),
            ("code_fence", &CODE_FENCE),
            ("code_decl", &CODE_DECL),
            ("code_line_end", &CODE_LINE_END),
            ("paper_cue", &PAPER_CUE),
            ("metadata_key", &METADATA_KEY),
        ] {
            assert!(pattern.is_some(), "pattern '{name}' failed to compile");
        }
    }

    #[test]
    fn test_classify_by_path() {
        let cases = [
            ("README.md", DocumentType::ReadmeOverview),
            ("docs/overview.md", DocumentType::ReadmeOverview),
            ("examples/basic.rs", DocumentType::ApiExamples),
            ("src/engine.rs", DocumentType::Code),
            ("papers/attention.pdf", DocumentType::Paper),
            ("Cargo.toml", DocumentType::Metadata),
            ("docs/guide.md", DocumentType::Documentation),
        ];
        for (path, expected) in cases {
            let f = Fragment::new("Plain prose without any cues.", "repo://x", "v1").with_path(path);
            assert_eq!(classify(&f), expected, "path {path}");
        }
    }

    #[test]
    fn test_classify_by_content() {
        let code = Fragment::new("fn main() {\n    let x = 1;\n}\nuse std::io;", "s", "v1");
        assert_eq!(classify(&code), DocumentType::Code);

        let paper = Fragment::new(
            "Abstract: we propose a tensor method. Smith et al. showed related work.",
            "s",
            "v1",
        );
        assert_eq!(classify(&paper), DocumentType::Paper);

        let readme = Fragment::new("# Overview\nThis library provides hybrid search.", "s", "v1");
        assert_eq!(classify(&readme), DocumentType::ReadmeOverview);

        let prose = Fragment::new("The meeting moved to Thursday afternoon.", "s", "v1");
        assert_eq!(classify(&prose), DocumentType::Documentation);
    }

    #[test]
    fn test_explicit_tag_wins() {
        let f = Fragment::new("fn main() {}", "s", "v1")
            .with_path("src/main.rs")
            .with_doc_type(DocumentType::Paper);
        assert_eq!(classify(&f), DocumentType::Paper);
    }

    #[test]
    fn test_tie_broken_by_priority() {
        // One paper cue and one metadata key: paper comes first in PRIORITY.
        let f = Fragment::new("abstract\nversion = 2", "s", "v1");
        assert_eq!(classify(&f), DocumentType::Paper);
    }

    #[test]
    fn test_boosts_reorder() {
        let params = RetrievalParams::default();
        let boosted = apply_boosts(
            vec![
                candidate(Fragment::new("plain a", "s", "v1").with_path("src/a.rs"), 0.50),
                candidate(Fragment::new("plain b", "s", "v1").with_path("README.md"), 0.45),
            ],
            &params,
        );
        assert_eq!(boosted[0].doc_type, DocumentType::ReadmeOverview);
        assert!((boosted[0].score - 0.60).abs() < 1e-9);
        assert!((boosted[1].boost - 0.02).abs() < 1e-9);
    }

    fn code_pool(n: usize) -> Vec<BoostedCandidate> {
        (0..n)
            .map(|i| BoostedCandidate {
                candidate: candidate(
                    Fragment::new(format!("chunk {i}"), "s", "v1").with_path(format!("src/f{i}.rs")),
                    1.0 - i as f64 * 0.01,
                ),
                doc_type: DocumentType::Code,
                boost: 0.0,
                score: 1.0 - i as f64 * 0.01,
            })
            .collect()
    }

    #[test]
    fn test_lone_readme_survives_code_flood() {
        let mut ranked = code_pool(30);
        ranked.push(BoostedCandidate {
            candidate: candidate(Fragment::new("readme", "s", "v1").with_path("README.md"), 0.2),
            doc_type: DocumentType::ReadmeOverview,
            boost: 0.0,
            score: 0.2,
        });
        let quotas = BTreeMap::from([(DocumentType::Code, 20), (DocumentType::ReadmeOverview, 2)]);
        let sel = select_with_quotas(&ranked, 5, &quotas);
        assert_eq!(sel.admitted.len(), 5);
        assert_eq!(sel.count_of(DocumentType::ReadmeOverview), 1);
        assert!(!sel.backfilled);
        // Returned in boosted order: readme is last.
        assert_eq!(sel.admitted[4].doc_type, DocumentType::ReadmeOverview);
    }

    #[test]
    fn test_quota_caps_bucket() {
        let mut ranked = code_pool(6);
        for i in 0..3 {
            ranked.push(BoostedCandidate {
                candidate: candidate(Fragment::new(format!("doc {i}"), "s", "v1"), 0.1),
                doc_type: DocumentType::Documentation,
                boost: 0.0,
                score: 0.1 - i as f64 * 0.01,
            });
        }
        let quotas = BTreeMap::from([(DocumentType::Code, 2)]);
        let sel = select_with_quotas(&ranked, 5, &quotas);
        assert_eq!(sel.count_of(DocumentType::Code), 2);
        assert_eq!(sel.count_of(DocumentType::Documentation), 3);
        assert!(!sel.backfilled);
    }

    #[test]
    fn test_backfill_when_quotas_starve() {
        let ranked = code_pool(6);
        let quotas = BTreeMap::from([(DocumentType::Code, 2)]);
        let sel = select_with_quotas(&ranked, 4, &quotas);
        assert_eq!(sel.admitted.len(), 4);
        assert!(sel.backfilled);
        let texts: Vec<&str> = sel
            .admitted
            .iter()
            .map(|c| c.candidate.fragment.text.as_str())
            .collect();
        assert_eq!(texts, vec!["chunk 0", "chunk 1", "chunk 2", "chunk 3"]);
    }

    #[test]
    fn test_zero_quota_bucket_only_via_backfill() {
        let ranked = code_pool(3);
        let quotas = BTreeMap::from([(DocumentType::Code, 0)]);
        let sel = select_with_quotas(&ranked, 2, &quotas);
        assert_eq!(sel.admitted.len(), 2);
        assert!(sel.backfilled);
    }

    #[test]
    fn test_duplicates_collapsed() {
        let mut ranked = code_pool(2);
        ranked.insert(1, ranked[0].clone());
        let sel = select_with_quotas(&ranked, 5, &BTreeMap::new());
        assert_eq!(sel.admitted.len(), 2);
    }
}
