//! Prompt text for analysis and OCR requests.

use cerberus_core::ProgramContext;

/// System prompt for artifact analysis.
pub const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are an expert document analyst for enterprise program management.

Analyze uploaded artifacts and extract structured metadata:
1. Document type classification (invoice, contract, meeting notes, report, email, memo, etc.)
2. Executive summary (2-3 sentences maximum) and key takeaways
3. Key topics and themes
4. People mentioned (name, role, organization, context)
5. Important facts (dates, amounts, metrics, commitments, deadlines)
6. Insights: decisions, action items, risks, or concerns
7. Sentiment (positive, neutral, concern, negative)
8. Priority level (1-5, where 5 is most critical)

Provide confidence scores (0.0-1.0) for extractions. Respond with JSON only.";

/// Output schema included in every analysis request.
pub const ANALYSIS_OUTPUT_SCHEMA: &str = r#"{
  "document_type": "invoice",
  "document_type_confidence": 0.98,
  "summary": "2-3 sentence executive summary",
  "key_takeaways": ["short takeaway"],
  "key_topics": [{"topic": "budget", "confidence": 0.95}],
  "persons_mentioned": [
    {"name": "Jane Doe", "role": "Program Director", "organization": "Acme Corp",
     "context": "Approved the Q3 budget", "confidence": 0.92}
  ],
  "facts": [
    {"type": "amount", "key": "invoice_total", "value": "$12,500.00",
     "numeric_value": 12500.0, "date_value": "2026-03-31", "unit": "USD", "confidence": 0.97}
  ],
  "insights": [
    {"type": "risk", "title": "Payment overdue", "description": "Invoice is 30 days past due",
     "severity": "medium", "suggested_action": "Escalate to finance",
     "impacted_modules": ["financial"], "confidence": 0.8}
  ],
  "sentiment": "neutral",
  "priority": 3
}"#;

/// User prompt for one artifact.
pub fn analysis_user_prompt(context: &ProgramContext, text: &str) -> String {
    let mut prompt = String::from("Program Context:\n");
    prompt.push_str(&format!("- Program: {}\n", context.program_name));
    if let Some(company) = context.company_name.as_deref().filter(|c| !c.is_empty()) {
        prompt.push_str(&format!("- Internal Organization: {}\n", company));
    }
    prompt.push_str("\nTask: Analyze this artifact and extract structured metadata.\n");
    prompt.push_str("Extract person names and organizations exactly as they appear.\n\n");
    prompt.push_str("Output as JSON matching this exact schema:\n");
    prompt.push_str(ANALYSIS_OUTPUT_SCHEMA);
    prompt.push_str("\n\nArtifact content:\n");
    prompt.push_str(text);
    prompt
}

/// Prompt for transcribing text out of an image.
pub const OCR_TRANSCRIPTION_PROMPT: &str = "\
Transcribe all text visible in this image exactly as written. \
Preserve line breaks and table layout where possible. \
Return only the transcribed text, with no commentary. \
If the image contains no text, return an empty response.";
