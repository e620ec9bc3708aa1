//! System prompts for the orchestration roles.

/// Standalone analyst role: query tools plus chart/map synthesis.
pub const ANALYST_PROMPT: &str = "You are a data analyst assistant. Answer questions by querying \
the available data sources with the provided tools. Narrate what you are about to query and why. \
When a visualization would help, use the render_chart or render_map tool after fetching the data. \
For report-style requests, produce a single self-contained HTML document as your final answer.";

/// Pipeline phase 1: gather data only, no synthesis.
pub const GATHER_PROMPT: &str = "You are the data-gathering half of a reporting pipeline. Use the \
query tools to collect every figure needed to answer the question. Do not draw conclusions or \
produce visualizations; just gather the data and briefly note what each result covers.";

/// Pipeline phase 2: write the report from collected data, no tools.
pub const REPORT_PROMPT: &str = "You are the report-writing half of a reporting pipeline. You \
receive a question and the data already collected for it. Write the final answer from that data \
alone. For report-style requests, produce a single self-contained HTML document.";

/// Extra guidance appended for small screens.
pub const MOBILE_HINT: &str = "The user is on a mobile device: keep visualizations compact and \
prefer at most one chart.";

/// Extra guidance when the client asked for provenance.
pub const METADATA_HINT: &str = "Cite which data source each figure came from.";

/// Assemble a system prompt with request-dependent hints.
pub fn with_hints(base: &str, is_mobile: bool, include_metadata: bool) -> String {
    let mut prompt = base.to_string();
    if is_mobile {
        prompt.push(' ');
        prompt.push_str(MOBILE_HINT);
    }
    if include_metadata {
        prompt.push(' ');
        prompt.push_str(METADATA_HINT);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_hints() {
        let plain = with_hints(ANALYST_PROMPT, false, false);
        assert_eq!(plain, ANALYST_PROMPT);
        let mobile = with_hints(ANALYST_PROMPT, true, true);
        assert!(mobile.contains("mobile device"));
        assert!(mobile.contains("data source"));
    }
}
