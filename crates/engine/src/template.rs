//! Template rendering utilities using Tera
//!
//! Alert mails are composed as plain text; the HTML alternative wraps that
//! text in [`EMAIL_ENVELOPE`].

use crate::{Error, Result};
use tera::{Context, Tera};

/// HTML layout for outgoing alert mails. Expects `subject`, `body` and `year`.
pub const EMAIL_ENVELOPE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>{{ subject }}</title>
  </head>
  <body style="font-family: Arial, sans-serif; background-color: #f4f4f4; padding: 20px;">
    <div style="max-width: 600px; margin: 0 auto; background: #ffffff; border-radius: 8px; padding: 24px;">
      <h2 style="color: #b45309;">{{ subject }}</h2>
      <p style="color: #333333; line-height: 1.5;">{{ body | escape | linebreaksbr | safe }}</p>
      <hr style="border: none; border-top: 1px solid #e5e5e5;">
      <p style="color: #888888; font-size: 12px;">&copy; {{ year }} Maintenance Management. This is an automated message.</p>
    </div>
  </body>
</html>
"#;

/// Render the HTML envelope around a plain-text mail body.
pub fn render_email_html(subject: &str, body: &str, year: i32) -> Result<String> {
    let mut context = Context::new();
    context.insert("subject", subject);
    context.insert("body", body);
    context.insert("year", &year);
    render("email.html", EMAIL_ENVELOPE, &context)
}

// Names ending in .html get Tera's autoescaping
fn render(name: &str, template: &str, context: &Context) -> Result<String> {
    let mut tera = Tera::default();
    tera.add_raw_template(name, template)
        .map_err(|e| Error::Internal(format!("Failed to parse template: {}", e)))?;

    tera.render(name, context)
        .map_err(|e| Error::Internal(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_envelope_escapes_and_breaks_lines() {
        let html = render_email_html("Alert", "Hello,\n\nThe task \"<Pump>\" is late.", 2024).unwrap();
        assert!(html.contains("Hello,<br><br>"));
        assert!(html.contains("&lt;Pump&gt;"));
        assert!(html.contains("&copy; 2024"));
    }

    #[test]
    fn test_subject_is_escaped() {
        let html = render_email_html("⚠️ Task \"<Pump>\" alert - Level3", "Late.", 2024).unwrap();
        assert!(html.contains("<title>⚠️ Task &quot;&lt;Pump&gt;&quot; alert - Level3</title>"));
    }

    #[test]
    fn test_invalid_template_is_error() {
        assert!(matches!(
            render("broken.html", "{{ unclosed", &Context::new()),
            Err(Error::Internal(_))
        ));
    }
}
