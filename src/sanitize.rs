//! Reversible tool-name transform.
//!
//! Internal tool names use dotted namespacing (`plugin.search_web`), but the
//! wire only accepts `[A-Za-z0-9_-]`. Internal names draw from
//! `[A-Za-z0-9_.]` (the dash is reserved for the wire side), so mapping `.`
//! to `-` is bijective and [`desanitize_tool_name`] recovers the original
//! exactly.

/// Rewrites an internal tool name into its wire-safe form.
///
/// # Examples
///
/// ```
/// use valet_llm::sanitize::{desanitize_tool_name, sanitize_tool_name};
///
/// let wire = sanitize_tool_name("plugin.search_web");
/// assert_eq!(wire, "plugin-search_web");
/// assert_eq!(desanitize_tool_name(&wire), "plugin.search_web");
/// ```
pub fn sanitize_tool_name(name: &str) -> String {
    name.replace('.', "-")
}

/// Recovers the internal tool name from its wire-safe form.
pub fn desanitize_tool_name(name: &str) -> String {
    name.replace('-', ".")
}
