//! Contact placeholder substitution for message bodies and prompts

use crate::model::Contact;

/// Placeholders understood by [`TemplateRenderer`]
pub const PLACEHOLDERS: [&str; 4] = [
    "{{contact.name}}",
    "{{contact.email}}",
    "{{contact.phone}}",
    "{{contact.status}}",
];

/// Renders `{{contact.*}}` placeholders
///
/// Substitution is literal: no escaping, no nesting, no expressions.
/// Placeholders other than [`PLACEHOLDERS`] are left as-is, and missing
/// email or phone values render as empty strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, template: &str, contact: &Contact) -> String {
        // Fast path for templates without placeholders
        if !template.contains("{{contact.") {
            return template.to_string();
        }

        let values = [
            contact.name.as_str(),
            contact.email.as_deref().unwrap_or_default(),
            contact.phone.as_deref().unwrap_or_default(),
            contact.status.as_str(),
        ];

        PLACEHOLDERS
            .iter()
            .zip(values)
            .fold(template.to_string(), |rendered, (placeholder, value)| {
                rendered.replace(placeholder, value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> Contact {
        Contact::new("Ada")
            .with_email("ada@example.com")
            .with_phone("555")
    }

    #[test]
    fn test_render_known_placeholders() {
        let rendered =
            TemplateRenderer::new().render("Hi {{contact.name}}, call {{contact.phone}}", &ada());

        assert_eq!(rendered, "Hi Ada, call 555");
    }

    #[test]
    fn test_unknown_placeholder_left_verbatim() {
        let rendered = TemplateRenderer::new().render("Dear {{contact.foo}}", &ada());
        assert_eq!(rendered, "Dear {{contact.foo}}");
    }

    #[test]
    fn test_repeated_and_mixed_placeholders() {
        let contact = ada().with_status("customer");
        let rendered = TemplateRenderer::new().render(
            "{{contact.name}} <{{contact.email}}> is a {{contact.status}}. Bye {{contact.name}}",
            &contact,
        );

        assert_eq!(
            rendered,
            "Ada <ada@example.com> is a customer. Bye Ada"
        );
    }

    #[test]
    fn test_missing_phone_renders_empty() {
        let rendered = TemplateRenderer::new().render("[{{contact.phone}}]", &Contact::new("Ada"));
        assert_eq!(rendered, "[]");
    }

    #[test]
    fn test_custom_fields_are_not_rendered() {
        let contact = ada().with_custom_field("company", serde_json::json!("Acme"));
        let rendered = TemplateRenderer::new().render("{{contact.company}}", &contact);

        assert_eq!(rendered, "{{contact.company}}");
    }
}
