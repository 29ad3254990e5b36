//! Row/column reconstruction from positioned text fragments.
//!
//! PDF content streams store text as independently positioned runs. Reading
//! them back in stream order loses every table: "Item", "Qty", "Rate" and
//! their values arrive as one flat sentence. This module builds two candidate
//! renderings of a page and picks between them:
//!
//! * **naive** — fragments in stream order, space-joined. Immune to geometry
//!   mistakes, so it is the floor.
//! * **geometric** — fragments bucketed into rows by vertical position and
//!   sorted left-to-right, with tabs at column gaps and newlines between rows.
//!   Preserves tables (amounts, dates, line items) but misjudged gaps can
//!   split or glue words.
//!
//! Geometry is only *preferred* when it is clearly richer (by
//! [`LayoutConfig::geometric_margin`]), and the longer candidate always wins
//! in the end, so the heuristic can add structure but never lose content.

use crate::config::LayoutConfig;
use std::collections::BTreeMap;
use tracing::trace;

/// One positioned text run, in PDF points with a top-left origin.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    /// Left edge.
    pub x: f32,
    /// Top edge; grows downward.
    pub y: f32,
    /// Rendered width.
    pub width: f32,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, x: f32, y: f32, width: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            width,
        }
    }

    fn right(&self) -> f32 {
        self.x + self.width
    }
}

/// All fragments of one page, in content-stream order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageFragments {
    /// 0-indexed page position in the document.
    pub index: usize,
    pub fragments: Vec<TextFragment>,
}

/// Which candidate a reconstruction settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    Naive,
    Geometric,
}

/// Both candidates plus the selected one.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub naive: String,
    pub geometric: String,
    pub chosen: Candidate,
    /// True when geometry beat naive by more than the margin.
    pub geometry_preferred: bool,
}

impl Reconstruction {
    /// The selected text.
    pub fn text(&self) -> &str {
        match self.chosen {
            Candidate::Naive => &self.naive,
            Candidate::Geometric => &self.geometric,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text().trim().is_empty()
    }
}

/// Build both candidates for a page and select one.
///
/// Zero fragments produce an empty reconstruction; nothing is fabricated.
pub fn reconstruct(fragments: &[TextFragment], cfg: &LayoutConfig) -> Reconstruction {
    if fragments.is_empty() {
        return Reconstruction {
            naive: String::new(),
            geometric: String::new(),
            chosen: Candidate::Naive,
            geometry_preferred: false,
        };
    }

    let naive = naive_text(fragments);
    let geometric = geometric_text(fragments, cfg);
    let (chosen, geometry_preferred) = select(&naive, &geometric, cfg.geometric_margin);

    trace!(
        naive_len = naive.chars().count(),
        geometric_len = geometric.chars().count(),
        ?chosen,
        "reconstructed page"
    );

    Reconstruction {
        naive,
        geometric,
        chosen,
        geometry_preferred,
    }
}

/// Stream-order concatenation with single-space joins.
pub fn naive_text(fragments: &[TextFragment]) -> String {
    let mut out = String::new();
    for frag in fragments {
        if frag.text.is_empty() {
            continue;
        }
        let needs_space = !out.is_empty()
            && !out.ends_with(char::is_whitespace)
            && !frag.text.starts_with(char::is_whitespace);
        if needs_space {
            out.push(' ');
        }
        out.push_str(&frag.text);
    }
    out
}

/// Row-bucketed rendering with tab/space/newline separators from gaps.
pub fn geometric_text(fragments: &[TextFragment], cfg: &LayoutConfig) -> String {
    // BTreeMap keeps bucket keys sorted top-to-bottom.
    let mut rows: BTreeMap<i64, Vec<&TextFragment>> = BTreeMap::new();
    for frag in fragments.iter().filter(|f| !f.text.is_empty()) {
        let key = (frag.y / cfg.row_tolerance).round() as i64;
        rows.entry(key).or_default().push(frag);
    }

    let mut out = String::new();
    let mut prev_row_y: Option<f32> = None;

    for row in rows.values_mut() {
        row.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
        let row_y = row.iter().map(|f| f.y).fold(f32::INFINITY, f32::min);

        if let Some(prev_y) = prev_row_y {
            if row_y - prev_y > cfg.line_gap {
                out.push('\n');
            } else if !out.ends_with(char::is_whitespace) {
                out.push(' ');
            }
        }

        let mut prev: Option<&TextFragment> = None;
        for frag in row.iter() {
            if let Some(p) = prev {
                let gap = frag.x - p.right();
                if gap > cfg.column_gap {
                    out.push('\t');
                } else if gap > cfg.word_gap {
                    out.push(' ');
                }
            }
            out.push_str(&frag.text);
            prev = Some(frag);
        }

        prev_row_y = Some(row_y);
    }

    out
}

/// Margin rule first, then the strictly-longer candidate overrides it.
fn select(naive: &str, geometric: &str, margin: f32) -> (Candidate, bool) {
    let naive_len = naive.chars().count();
    let geo_len = geometric.chars().count();

    let geometry_preferred = geo_len as f64 > naive_len as f64 * (1.0 + margin as f64);
    let mut chosen = if geometry_preferred {
        Candidate::Geometric
    } else {
        Candidate::Naive
    };

    match chosen {
        Candidate::Naive if geo_len > naive_len => chosen = Candidate::Geometric,
        Candidate::Geometric if naive_len > geo_len => chosen = Candidate::Naive,
        _ => {}
    }

    (chosen, geometry_preferred)
}
