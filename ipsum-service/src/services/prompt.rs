//! Rendering of the single user message sent to the model.

use crate::models::GenerationRequest;

/// Build the instruction asking the model for themed placeholder text.
pub fn render_prompt(req: &GenerationRequest) -> String {
    let theme = &req.theme;
    let length = req.paragraph_length.instruction();

    format!(
        "Generate fake \"lorem ipsum\" style placeholder text on the theme \"{theme}\".\n\
         The text must contain {paragraphs} paragraph(s), with {length}.\n\
         \n\
         Important rules:\n\
         - Use vocabulary and references linked to the theme \"{theme}\"\n\
         - Sentences should have a structure similar to lorem ipsum (somewhat artificial but readable)\n\
         - Mix words from the theme with classic filler connective words\n\
         - Start each paragraph with a capital letter\n\
         - Make sure the text stays coherent with the chosen theme\n\
         - The result must be filler text, not real informative content\n\
         - Follow the length instruction carefully: {length}\n\
         \n\
         Respond only with the generated text, without comments or explanations.",
        paragraphs = req.paragraphs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParagraphLength;

    fn request(length: ParagraphLength) -> GenerationRequest {
        GenerationRequest {
            theme: "Space pirates".to_string(),
            paragraphs: 3,
            paragraph_length: length,
            stream: true,
        }
    }

    #[test]
    fn prompt_embeds_theme_count_and_length() {
        let prompt = render_prompt(&request(ParagraphLength::Long));
        assert!(prompt.contains("\"Space pirates\""));
        assert!(prompt.contains("3 paragraph(s)"));
        assert!(prompt.contains(ParagraphLength::Long.instruction()));
    }

    #[test]
    fn prompt_forbids_commentary_and_real_content() {
        let prompt = render_prompt(&request(ParagraphLength::Short));
        assert!(prompt.contains("without comments or explanations"));
        assert!(prompt.contains("not real informative content"));
        assert!(prompt.contains("capital letter"));
        assert!(prompt.contains("filler connective words"));
    }

    #[test]
    fn length_instruction_varies_with_request() {
        let short = render_prompt(&request(ParagraphLength::Short));
        let variable = render_prompt(&request(ParagraphLength::Variable));
        assert!(!short.contains(ParagraphLength::Variable.instruction()));
        assert!(variable.contains(ParagraphLength::Variable.instruction()));
    }
}
