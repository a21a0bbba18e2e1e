//! Page templates, compiled into the binary.

use minijinja::Environment;
use serde::Serialize;

pub const BASE: &str = "base.html";
pub const DASHBOARD: &str = "dashboard.html";
pub const CHAT: &str = "chat.html";
pub const PLAN: &str = "plan.html";
pub const ITINERARY_PDF: &str = "itinerary_pdf.html";

const SOURCES: &[(&str, &str)] = &[
    (BASE, include_str!("base.html")),
    (DASHBOARD, include_str!("dashboard.html")),
    (CHAT, include_str!("chat.html")),
    (PLAN, include_str!("plan.html")),
    (ITINERARY_PDF, include_str!("itinerary_pdf.html")),
];

/// Shared template environment. `.html` templates are auto-escaped.
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        for &(name, source) in SOURCES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn all_templates_compile() {
        let templates = Templates::new().unwrap();
        for &(name, _) in SOURCES {
            assert!(templates.env.get_template(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn user_text_is_escaped() {
        let templates = Templates::new().unwrap();
        let html = templates
            .render(ITINERARY_PDF, context! { itinerary => "<script>alert(1)</script>\nDay 2" })
            .unwrap();
        assert!(html.contains("Your Travel Itinerary"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("\nDay 2"));
    }

    #[test]
    fn dashboard_lists_facts_and_tips() {
        let templates = Templates::new().unwrap();
        let html = templates
            .render(
                DASHBOARD,
                context! {
                    user_name => "Ana",
                    facts => vec!["Iceland has no mosquitoes."],
                    tips => vec!["Always carry a backup power bank."],
                },
            )
            .unwrap();
        assert!(html.contains("Welcome, Ana!"));
        assert!(html.contains("<li>Iceland has no mosquitoes.</li>"));
        assert!(html.contains("<li>Always carry a backup power bank.</li>"));
    }

    #[test]
    fn unknown_template_is_an_error() {
        assert!(Templates::new().unwrap().render("missing.html", ()).is_err());
    }
}
