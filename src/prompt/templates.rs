/// Appended to every stage as the negative prompt.
pub const NEGATIVE_PROMPT: &str = "lowres, bad anatomy, bad hands, text, error, missing fingers, \
extra digit, fewer digits, cropped, worst quality, low quality, normal quality, jpeg artifacts, \
signature, watermark, username, blurry, artist name, bad feet, distorted, ugly";

pub fn lineart_prompt(tags: &str) -> String {
    format!(
        "masterpiece, best quality, monochrome, lineart, clean lines, white background, \
         simple background, {tags}"
    )
}

pub fn flat_color_prompt(tags: &str) -> String {
    format!(
        "masterpiece, best quality, flat color, flat shading, base colors only, no lighting, \
         no shadow, simple background, {tags}"
    )
}

pub fn shading_prompt(tags: &str) -> String {
    format!(
        "masterpiece, best quality, dramatic lighting, strong rim light, deep shadows, \
         cinematic lighting, volumetric lighting, {tags}"
    )
}
