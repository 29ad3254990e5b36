//! Pipeline stages for document text acquisition.
//!
//! Each submodule implements one step. The PDF path is the long one:
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ format ──▶ pdf ──▶ layout ──▶ page ──────────────▶ assemble
//! (path/URL) (sniff)   (pdfium) (rows/cols)  │                  (join)
//!                                            └─▶ render ─▶ encode ─▶ cascade ─▶ postprocess
//!                                                (pdfium)  (base64)  (provider)  (cleanup)
//! ```
//!
//! 1. [`input`]    — read the user-supplied path or URL into memory
//! 2. [`pdf`]      — open the PDF and collect positioned text fragments;
//!    blocking, runs in `spawn_blocking`
//! 3. [`layout`]   — rebuild rows and columns from fragment geometry and
//!    pick between the naive and geometric reconstructions
//! 4. [`page`]     — per-page state machine deciding whether OCR runs and
//!    which text wins
//! 5. [`render`] / [`encode`] — rasterise one page to PNG and wrap it as a
//!    base64 image for the vision request
//! 6. [`cascade`]  — walk provider tiers, models and credentials;
//!    [`provider`] speaks the wire dialects and [`classify`] turns their
//!    failures into an [`crate::error::ErrorKind`]
//! 7. [`postprocess`] — deterministic cleanup of OCR completions
//! 8. [`assemble`] — join pages (or archive sections) into the final text
//!
//! The non-PDF containers are single steps: [`docx`], [`text`], and
//! [`archive`], whose members are fed back through the whole pipeline.

pub mod archive;
pub mod assemble;
pub mod cascade;
pub mod classify;
pub mod docx;
pub mod encode;
pub mod input;
pub mod layout;
pub mod page;
pub mod pdf;
pub mod postprocess;
pub mod provider;
pub mod render;
pub mod text;
