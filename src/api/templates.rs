//! Server-rendered pages. Templates are compiled into the binary and rendered
//! with HTML auto-escaping.

use tera::{Context, Tera};

const LAYOUT: &str = include_str!("templates/layout.html");
const INDEX: &str = include_str!("templates/index.html");
const LOGIN: &str = include_str!("templates/login.html");

#[derive(Debug)]
pub struct Templates {
    tera: Tera,
}

impl Templates {
    /// Parse the embedded templates.
    ///
    /// # Errors
    /// Returns an error if a template fails to parse.
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("layout.html", LAYOUT),
            ("index.html", INDEX),
            ("login.html", LOGIN),
        ])?;
        Ok(Self { tera })
    }

    fn layout_context(user_email: Option<&str>) -> Context {
        let mut context = Context::new();
        context.insert("user_email", &user_email);
        context
    }

    /// Landing page.
    ///
    /// # Errors
    /// Returns an error if rendering fails.
    pub fn home(&self, user_email: Option<&str>) -> Result<String, tera::Error> {
        self.tera
            .render("index.html", &Self::layout_context(user_email))
    }

    /// Sign in / sign up form with an optional status message.
    ///
    /// # Errors
    /// Returns an error if rendering fails.
    pub fn login(
        &self,
        user_email: Option<&str>,
        message: Option<&str>,
    ) -> Result<String, tera::Error> {
        let mut context = Self::layout_context(user_email);
        context.insert("message", &message);
        self.tera.render("login.html", &context)
    }
}
