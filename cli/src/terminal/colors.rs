use colored::Color;

pub const PRIMARY: Color = Color::TrueColor { r: 94, g: 186, b: 255 };
pub const ACCENT: Color = Color::TrueColor { r: 255, g: 196, b: 87 };
pub const SEPARATOR: Color = Color::BrightBlack;
pub const TEXT_DEFAULT: Color = Color::White;
pub const SUCCEEDED: Color = Color::Green;
pub const FAILED: Color = Color::Red;
pub const KEY_VALUE: Color = Color::BrightMagenta;
pub const WARNING: Color = Color::Yellow;
