//! Share tokens, links and QR codes for patient access keys

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use qrcode::render::svg;
use qrcode::QrCode;

/// Random URL-safe token with 256 bits of entropy
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Link a patient opens to read the summary
pub fn share_link(public_base_url: &str, token: &str) -> String {
    format!(
        "{}/public/summary?key={}",
        public_base_url.trim_end_matches('/'),
        token
    )
}

/// SMS text announcing a shared summary
pub fn share_message(title: &str, link: &str) -> String {
    format!("Your discharge instructions \"{}\" are ready: {}", title, link)
}

/// Normalise a phone number to `+` and digits; None when implausible
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '(' | ')' | '.' => {}
            _ => return None,
        }
    }

    (7..=15)
        .contains(&digits.len())
        .then(|| format!("{}{}", plus, digits))
}

/// Render `url` as an SVG QR code
pub fn qr_svg(url: &str) -> Result<String, qrcode::types::QrError> {
    let code = QrCode::new(url.as_bytes())?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(200, 200)
        .max_dimensions(300, 300)
        .dark_color(svg::Color("#111827"))
        .light_color(svg::Color("#ffffff"))
        .quiet_zone(true)
        .build())
}
