// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Prompt templates for the four LLM calls a search makes.

/// First draft for the root node
pub fn initial(question: &str) -> String {
    format!(
        r#"<instruction>
Answer the question below. Ignore unusual casing, punctuation or accent marks.
</instruction>

<question>
{question}
</question>
"#
    )
}

/// One-sentence improvement suggestion for a draft
pub fn critique(question: &str, answer: &str) -> String {
    format!(
        r#"<instruction>
Suggest how the draft answer below could be improved.
Reply with the suggestion only, as a single sentence.
</instruction>

<question>
{question}
</question>

<draft>
{answer}
</draft>
"#
    )
}

/// Revised draft addressing a critique
pub fn revise(question: &str, answer: &str, critique: &str) -> String {
    format!(
        r#"<instruction>
Read the question and the draft answer, then the critique of that draft.
Write a revised answer that addresses the critique. Reply with the revised answer only.
</instruction>

<question>
{question}
</question>

<draft>
{answer}
</draft>

<critique>
{critique}
</critique>
"#
    )
}

/// 1-10 rating of a draft
pub fn evaluate(question: &str, answer: &str) -> String {
    format!(
        r#"Given the following text:
"{answer}"

How well does it answer this question:
"{question}"

Rate the answer from 1 to 10, where 1 is completely wrong or irrelevant and 10 is a perfect answer.
Reply with a single number between 1 and 10 and nothing else.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_embed_inputs() {
        assert!(initial("Q?").contains("<question>\nQ?\n</question>"));
        assert!(critique("Q?", "A.").contains("<draft>\nA.\n</draft>"));

        let revised = revise("Q?", "A.", "Be precise.");
        assert!(revised.contains("<critique>\nBe precise.\n</critique>"));

        let rating = evaluate("Q?", "A.");
        assert!(rating.contains("\"A.\""));
        assert!(rating.contains("\"Q?\""));
    }

    #[test]
    fn test_templates_are_distinguishable() {
        // Scripted test providers route on these markers
        assert!(critique("q", "a").contains("Suggest how"));
        assert!(revise("q", "a", "c").contains("revised answer"));
        assert!(evaluate("q", "a").contains("Rate the answer"));
        assert!(initial("q").contains("Answer the question below"));
    }
}
