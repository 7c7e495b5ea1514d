//! Prompts for dish parsing, vision OCR, and image generation.
//!
//! Every prompt lives here so tests can inspect them directly and so the
//! parser's contract (the literal `ERROR` token, a bare JSON array) is stated
//! in exactly one place. Callers can override the parser instruction via
//! [`crate::config::PipelineConfig::system_prompt`].

/// Literal reply the model gives when the text is not a food menu.
pub const NOT_A_MENU_TOKEN: &str = "ERROR";

/// Default system instruction for the dish parser.
pub const MENU_SYSTEM_PROMPT: &str = r#"You are a helpful assistant that extracts dish names and short, appetizing descriptions from restaurant menus.

If the provided text is not a food menu, reply with ONLY the word ERROR.

If it is a menu, choose the top 5 dishes by your own judgment (popularity, uniqueness, or taste appeal) and reply with a JSON array of exactly 5 objects, each with:
- "name": the dish name as written on the menu
- "description": a short, appetizing description of the dish

Reply ONLY with the JSON array or ERROR. Do not add commentary.

Example: [{"name":"Tiramisu","description":"Classic Italian dessert with coffee-soaked ladyfingers and mascarpone cream"}, ...]"#;

/// System instruction for the vision OCR backend.
pub const VISION_OCR_PROMPT: &str = r#"You are an OCR engine. Transcribe every piece of text visible in the photo exactly as printed, in reading order, one line per printed line.

Output ONLY the transcribed text. Do not describe the image, do not translate, do not add commentary. If there is no readable text, output nothing."#;

/// Build the image-generation prompt for one dish.
pub fn dish_image_prompt(dish_name: &str) -> String {
    format!(
        "A photorealistic, beautifully plated dish on a clean white ceramic plate: {}. \
Professional food photography, restaurant menu style, studio lighting, shallow depth of field, \
vibrant colors, ultra high detail, clean background. No text, no watermark, no people.",
        dish_name.trim()
    )
}
