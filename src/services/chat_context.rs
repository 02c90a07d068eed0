//! Builds the deal context handed to the chat model.
//!
//! Three layouts, chosen by the page the user is on:
//! - analysis page: full detail for the current deal plus a condensed
//!   comparison of every other analysed deal
//! - deals overview: the condensed view for every analysed deal
//! - single deal: identity line plus summary, confidence and metrics
//!
//! Store failures never fail the chat; whatever was built before the
//! failure is used.

use anyhow::Result;
use futures::future::try_join_all;
use std::fmt::Write;
use tracing::warn;

use crate::domain::{metric_display, AnalysisResult, AnalyzedDocument, ChatRequest, Deal};
use crate::store::DealStore;

const TRUNCATION_MARKER: &str = "\n\n[Context truncated]";

/// Which deals the context covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatScope {
    None,
    Deal(i32),
    Overview,
    Analysis(i32),
}

impl ChatScope {
    pub fn from_request(req: &ChatRequest) -> Self {
        match (req.deal_id, req.is_analysis_page, req.is_deals_page) {
            (Some(deal_id), true, _) => Self::Analysis(deal_id),
            (_, _, true) => Self::Overview,
            (Some(deal_id), _, _) => Self::Deal(deal_id),
            (None, _, false) => Self::None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContextLimits {
    /// Deals rendered in overview and comparison sections.
    pub max_deals: usize,
    /// Total characters, marker excluded.
    pub max_chars: usize,
}

/// Assemble the context block for a chat turn.
pub async fn build_context(store: &dyn DealStore, scope: ChatScope, limits: ContextLimits) -> String {
    let mut context = String::new();

    let assembled = match scope {
        ChatScope::None => Ok(()),
        ChatScope::Deal(deal_id) => write_single_deal(store, deal_id, &mut context).await,
        ChatScope::Overview => write_overview(store, limits, &mut context).await,
        ChatScope::Analysis(deal_id) => {
            write_analysis_view(store, deal_id, limits, &mut context).await
        }
    };

    if let Err(e) = assembled {
        warn!(error = ?e, ?scope, partial_len = context.len(), "Chat context incomplete");
    }

    truncate_context(context, limits.max_chars)
}

async fn write_single_deal(store: &dyn DealStore, deal_id: i32, out: &mut String) -> Result<()> {
    let Some(deal) = store.get_deal(deal_id).await? else {
        return Ok(());
    };

    write!(
        out,
        "Deal: {} ({})",
        deal.name,
        deal.property_type.map(|p| p.as_str()).unwrap_or("Unknown Type")
    )?;

    let documents = store.analyzed_documents(deal_id).await?;
    if documents.is_empty() {
        return Ok(());
    }

    write!(out, "\nDocuments analyzed: {}", documents.len())?;
    for doc in &documents {
        let analysis = &doc.analysis;
        write!(out, "\n\n{}:\n", doc.original_filename)?;
        writeln!(out, "Summary: {}", analysis.summary.as_deref().unwrap_or("N/A"))?;
        writeln!(out, "Confidence: {}", confidence_label(analysis.confidence))?;
        for (key, value) in &analysis.key_metrics {
            writeln!(out, "{}: {}", key, metric_display(value))?;
        }
    }
    Ok(())
}

async fn write_overview(store: &dyn DealStore, limits: ContextLimits, out: &mut String) -> Result<()> {
    let deals = store.list_deals().await?;
    let analysed = with_analysis(store, deals).await?;
    if analysed.is_empty() {
        return Ok(());
    }

    write!(out, "ALL DEALS OVERVIEW ({} deals with analysis):\n\n", analysed.len())?;
    write_condensed_deals(out, "DEAL", &analysed, limits.max_deals)?;
    out.push_str(
        "\nYou can ask questions to compare deals, analyze specific metrics, identify best \
         opportunities, or get insights about any aspect of these deals.",
    );
    Ok(())
}

async fn write_analysis_view(
    store: &dyn DealStore,
    deal_id: i32,
    limits: ContextLimits,
    out: &mut String,
) -> Result<()> {
    if let Some(deal) = store.get_deal(deal_id).await? {
        writeln!(out, "DETAILED ANALYSIS VIEW - {}", deal.name)?;
        writeln!(
            out,
            "Property Type: {}",
            deal.property_type.map(|p| p.as_str()).unwrap_or("Unknown")
        )?;
        writeln!(out, "Address: {}", deal.address.as_deref().unwrap_or("Not specified"))?;
        write!(out, "Status: {}\n\n", deal.status)?;

        let documents = store.analyzed_documents(deal_id).await?;
        if !documents.is_empty() {
            out.push_str("COMPREHENSIVE ANALYSIS DATA FOR CURRENT DEAL:\n\n");
            for (index, doc) in documents.iter().enumerate() {
                write_detailed_document(out, index, doc)?;
            }
        }
    }

    let rule = "=".repeat(80);
    write!(out, "\n{}\nALL OTHER DEALS FOR COMPARISON:\n{}\n\n", rule, rule)?;

    let others: Vec<Deal> = store
        .list_deals()
        .await?
        .into_iter()
        .filter(|d| d.id != deal_id)
        .collect();

    if !others.is_empty() {
        let analysed = with_analysis(store, others).await?;
        if analysed.is_empty() {
            out.push_str("No other deals with analysis data available for comparison.\n\n");
        } else {
            write!(out, "COMPARISON DEALS ({} deals with analysis):\n\n", analysed.len())?;
            write_condensed_deals(out, "COMPARISON DEAL", &analysed, limits.max_deals)?;
        }
    }

    out.push_str(
        "\nYou have access to ALL detailed analysis data for the current deal AND all other deals \
         for comparison. You can compare metrics, performance, risks, and opportunities across all deals.",
    );
    Ok(())
}

/// Pair each deal with its analysed documents, keeping only deals that have some.
async fn with_analysis(
    store: &dyn DealStore,
    deals: Vec<Deal>,
) -> Result<Vec<(Deal, Vec<AnalyzedDocument>)>> {
    let documents = try_join_all(deals.iter().map(|deal| store.analyzed_documents(deal.id))).await?;

    Ok(deals
        .into_iter()
        .zip(documents)
        .filter(|(_, docs)| !docs.is_empty())
        .collect())
}

fn write_detailed_document(out: &mut String, index: usize, doc: &AnalyzedDocument) -> std::fmt::Result {
    let analysis = &doc.analysis;

    writeln!(out, "DOCUMENT {}: {}", index + 1, doc.original_filename)?;
    writeln!(out, "{}", "=".repeat(50))?;

    if let Some(summary) = &analysis.summary {
        write!(out, "Summary: {}\n\n", summary)?;
    }
    if analysis.confidence.is_some() {
        write!(out, "Confidence Score: {}\n\n", confidence_label(analysis.confidence))?;
    }

    if !analysis.key_metrics.is_empty() {
        out.push_str("KEY METRICS:\n");
        for (key, value) in &analysis.key_metrics {
            writeln!(out, "  • {}: {}", key, metric_display(value))?;
        }
        out.push('\n');
    }

    if let Some(fh) = &analysis.financial_highlights {
        out.push_str("FINANCIAL HIGHLIGHTS:\n");
        write_nested_list(out, "Revenue Items", &fh.revenue_items)?;
        write_nested_list(out, "Expense Items", &fh.expense_items)?;
        write_nested_list(out, "Profitability Notes", &fh.profitability_notes)?;
        out.push('\n');
    }

    if let Some(pi) = &analysis.property_insights {
        out.push_str("PROPERTY INSIGHTS:\n");
        write_nested_list(out, "Strengths", &pi.strengths)?;
        write_nested_list(out, "Concerns", &pi.concerns)?;
        out.push('\n');
    }

    write_bullets(out, "IDENTIFIED RISKS", &analysis.risks)?;
    write_bullets(out, "RECOMMENDATIONS", &analysis.recommendations)?;

    out.push('\n');
    Ok(())
}

fn write_nested_list(out: &mut String, title: &str, items: &[String]) -> std::fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(out, "  {}:", title)?;
    for item in items {
        writeln!(out, "    - {}", item)?;
    }
    Ok(())
}

fn write_bullets(out: &mut String, title: &str, items: &[String]) -> std::fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(out, "{}:", title)?;
    for item in items {
        writeln!(out, "  • {}", item)?;
    }
    out.push('\n');
    Ok(())
}

fn write_condensed_deals(
    out: &mut String,
    heading: &str,
    deals: &[(Deal, Vec<AnalyzedDocument>)],
    max_deals: usize,
) -> std::fmt::Result {
    for (index, (deal, documents)) in deals.iter().take(max_deals).enumerate() {
        writeln!(out, "{} {}: {}", heading, index + 1, deal.name)?;
        writeln!(
            out,
            "- Property Type: {}",
            deal.property_type.map(|p| p.as_str()).unwrap_or("Unknown")
        )?;
        writeln!(out, "- Status: {}", deal.status)?;
        writeln!(out, "- Documents: {}", documents.len())?;

        for doc in documents {
            write_condensed_document(out, &doc.original_filename, &doc.analysis)?;
        }

        out.push_str("\n---\n\n");
    }

    let omitted = deals.len().saturating_sub(max_deals);
    if omitted > 0 {
        write!(
            out,
            "({} older deals with analysis not shown)\n\n",
            omitted
        )?;
    }
    Ok(())
}

fn write_condensed_document(
    out: &mut String,
    filename: &str,
    analysis: &AnalysisResult,
) -> std::fmt::Result {
    write!(out, "\n{} Analysis:\n", filename)?;
    writeln!(out, "  Summary: {}", analysis.summary.as_deref().unwrap_or("N/A"))?;
    writeln!(out, "  Confidence: {}", confidence_label(analysis.confidence))?;

    if !analysis.key_metrics.is_empty() {
        out.push_str("  Key Metrics:\n");
        for (key, value) in &analysis.key_metrics {
            writeln!(out, "    - {}: {}", key, metric_display(value))?;
        }
    }

    if let Some(fh) = &analysis.financial_highlights {
        write_joined(out, "Revenue Items", &fh.revenue_items, usize::MAX)?;
        write_joined(out, "Expense Items", &fh.expense_items, usize::MAX)?;
        write_joined(out, "Profitability", &fh.profitability_notes, usize::MAX)?;
    }
    if let Some(pi) = &analysis.property_insights {
        write_joined(out, "Strengths", &pi.strengths, usize::MAX)?;
        write_joined(out, "Concerns", &pi.concerns, usize::MAX)?;
    }

    write_joined(out, "Top Risks", &analysis.risks, 3)?;
    write_joined(out, "Key Recommendations", &analysis.recommendations, 3)
}

fn write_joined(out: &mut String, title: &str, items: &[String], limit: usize) -> std::fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    let shown = &items[..items.len().min(limit)];
    writeln!(out, "  {}: {}", title, shown.join(", "))
}

/// `0.85` → `85%`; `N/A` when the analysis carries no score.
pub fn confidence_label(confidence: Option<f64>) -> String {
    match confidence {
        Some(score) => format!("{}%", (score * 100.0).round() as i64),
        None => "N/A".to_string(),
    }
}

/// Cut to `max_chars` characters on a char boundary, appending a marker.
pub fn truncate_context(mut context: String, max_chars: usize) -> String {
    if let Some((cut, _)) = context.char_indices().nth(max_chars) {
        context.truncate(cut);
        context.push_str(TRUNCATION_MARKER);
    }
    context
}
