//! Prompt templates.
//!
//! Generation prompts are chosen per category with a plain `match`. Every
//! prompt asks for a single JSON object so the response can go through
//! `vigen_core::extract_json_object`.

use vigen_core::{Category, Difficulty, Question, VisualSpec};

/// JSON shape every generation prompt asks for.
pub const ITEM_JSON_FORMAT: &str = r#"Respond ONLY with JSON in this format:
```json
{
    "stem": "question text",
    "choices": [
        {"label": "A", "text": "choice 1"},
        {"label": "B", "text": "choice 2"},
        {"label": "C", "text": "choice 3"},
        {"label": "D", "text": "choice 4"}
    ],
    "correct_answer": "label of the correct choice",
    "explanation": "explanation citing what is visible in the image",
    "evidence_facts": ["visual fact 1", "visual fact 2"]
}
```"#;

const GRAPH_PROMPT: &str = r#"This image is a graph.

**Analysis:**
1. Identify the kind of graph (bar, line, pie, ...).
2. Zoom into specific ranges if needed to read values exactly.
3. Read axis labels, the legend and the data points precisely.

List the facts you read as bullet lines starting with "-".

**Task:**
Write ONE multiple-choice question that uses only information you can verify directly on the graph."#;

const GEOMETRY_PROMPT: &str = r#"This image is a geometric figure.

**Analysis:**
1. Identify the shapes and their properties.
2. Analyse lengths, angles and positional relationships.
3. Zoom into parts of the figure when a detail is hard to judge.

List the facts you read as bullet lines starting with "-".

**Task:**
Write ONE multiple-choice question using only conditions with clear visual evidence.
Do not estimate values that cannot be confirmed from the image."#;

const MEASUREMENT_PROMPT: &str = r#"This image shows a measuring instrument or measured values.

**Analysis:**
1. Identify the instrument.
2. Check the scale divisions and units carefully.
3. Zoom into the reading area when it is hard to read.

List the facts you read as bullet lines starting with "-".

**Task:**
Write ONE multiple-choice question using only measurements that can be verified from the image.
Accuracy of the reading is essential."#;

/// Analysis and task instructions for a category.
pub fn category_prompt(category: Category) -> &'static str {
    match category {
        Category::Graph => GRAPH_PROMPT,
        Category::Geometry => GEOMETRY_PROMPT,
        Category::Measurement => MEASUREMENT_PROMPT,
    }
}

pub fn difficulty_instruction(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => {
            "**Difficulty: easy** - ask about simple information that can be read directly from the image."
        }
        Difficulty::Medium => {
            "**Difficulty: medium** - ask a question that needs one step of reasoning from the image."
        }
        Difficulty::Hard => {
            "**Difficulty: hard** - ask a question that combines several pieces of information from the image."
        }
    }
}

fn action_budget(max_actions: u32) -> String {
    format!(
        "You may run code to zoom, crop or measure at most {} times before answering.",
        max_actions
    )
}

/// Full generation prompt. `custom` replaces the category template.
pub fn generation_prompt(
    category: Category,
    difficulty: Difficulty,
    max_actions: u32,
    custom: Option<&str>,
) -> String {
    let base = custom.unwrap_or_else(|| category_prompt(category));
    format!(
        "{}\n\n{}\n\n{}\n\n{}",
        base,
        action_budget(max_actions),
        ITEM_JSON_FORMAT,
        difficulty_instruction(difficulty)
    )
}

const VERDICT_FORMAT: &str = r#"**Response format:**
Respond ONLY with JSON in this format:
```json
{
    "is_valid": true,
    "failure_codes": ["AMBIGUOUS_READ", "NO_VISUAL_EVIDENCE", "MULTI_CORRECT", "OPTION_OVERLAP", "OUT_OF_SCOPE", "INVALID_FORMAT"],
    "details": ["detail 1"],
    "recommendations": ["recommendation 1"]
}
```

Include only the failure codes that apply. Use an empty array when there is no problem."#;

fn item_block(question: &Question) -> String {
    format!(
        "**Item:**\n- Question: {}\n- Choices:\n{}\n- Answer: {}\n- Explanation: {}",
        question.stem,
        question.choices_block(),
        question.correct_answer,
        question.explanation
    )
}

/// Judge prompt comparing an item against its source image.
pub fn consistency_prompt(question: &Question) -> String {
    format!(
        r#"You are an expert reviewer of educational assessment items.

Verify that the item below was written correctly from this image.

{}

**Criteria:**
1. Does the question ask about information that can be confirmed in the image?
2. Can the correct answer be verified from the image?
3. Are the wrong choices plausible mistakes rather than unrelated to the image?
4. Does the explanation agree with the image?
5. Is the correct answer unique, with no second defensible answer?

{}"#,
        item_block(question),
        VERDICT_FORMAT
    )
}

/// Text-only judge prompt for item quality.
pub fn quality_prompt(question: &Question) -> String {
    format!(
        r#"You are an expert editor of multiple-choice items. You cannot see the image; judge the item text only.

{}

**Evidence the author cited:**
{}

**Criteria:**
1. Is the question clear and answerable with a single reading?
2. Do any two choices overlap or mean the same thing?
3. Could more than one choice be defended as correct?
4. Does the explanation actually justify the designated answer?

{}"#,
        item_block(question),
        evidence_lines(question),
        VERDICT_FORMAT
    )
}

fn evidence_lines(question: &Question) -> String {
    if question.evidence.extracted_facts.is_empty() {
        return "- (none)".to_string();
    }
    question
        .evidence
        .extracted_facts
        .iter()
        .map(|f| format!("- {}", f))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt asking an image model to render `spec`.
pub fn illustration_prompt(spec: &VisualSpec) -> String {
    let data = serde_json::to_string_pretty(&spec.data).unwrap_or_default();
    format!(
        "Create a {} illustration.\n\nDescription: {}\n\nData:\n{}\n\nRendering instructions:\n{}",
        spec.visual_type, spec.description, data, spec.rendering_instructions
    )
}

/// Layout prompt for one rendered exam page.
pub fn layout_prompt(page_number: u32, max_actions: u32) -> String {
    format!(
        r#"This image is page {} of a scanned exam.

Locate every numbered item and every shared reading passage on the page.
Items are usually laid out in two columns; a passage may continue into the next column.
{}

Respond ONLY with JSON in this format:
```json
{{
    "layout": {{"columns": 2, "width": 1654, "height": 2339, "item_number_pattern": "N."}},
    "items": [
        {{"item_number": "1", "bbox": [x1, y1, x2, y2], "item_type": "standalone", "passage_ref": null, "confidence": 0.95}}
    ],
    "passages": [
        {{"passage_id": "37-38", "bbox": [x1, y1, x2, y2], "bbox_list": [], "item_range": "37~38"}}
    ]
}}
```

Coordinates are pixels from the top-left corner. Use "passage_group" and set passage_ref for items that share a passage."#,
        page_number,
        action_budget(max_actions)
    )
}
