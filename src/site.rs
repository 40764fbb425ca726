// src/site.rs
//
// Every site-specific selector and URL lives here and nowhere else. The
// defaults target the marketplace the tool was written against; all of them
// can be overridden from the settings file when the site's markup shifts.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    pub base_url: String,
    pub login_url: String,
    /// Format string with `{query}` substituted by the URL-encoded search
    /// term.
    pub search_url: String,

    // Login flow
    pub login_link: String,
    pub username_field: String,
    pub username_continue: String,
    pub password_field: String,
    pub login_submit: String,
    pub logged_in_marker: String,
    pub user_menu: String,
    pub logout_link: String,

    // Secondary security question
    pub security_question_form: String,
    pub security_question_text: String,

    // Anti-automation challenge probes
    pub challenge_frame: String,
    /// Substring matched against iframe `src` attributes as the second,
    /// generic probe.
    pub challenge_src_marker: String,

    // Listing cards
    pub job_card: String,
    pub job_title_link: String,
    pub job_description: String,
    pub job_posted: String,
    pub job_budget: String,
    /// Attributes tried in order for the site-assigned posting id.
    pub job_id_attrs: Vec<String>,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            base_url: "https://www.upwork.com".into(),
            login_url: "https://www.upwork.com/ab/account-security/login".into(),
            search_url: "https://www.upwork.com/nx/jobs/search/?q={query}&sort=recency".into(),

            login_link: "a[href*='login']".into(),
            username_field: "#login_username".into(),
            username_continue: "#login_password_continue".into(),
            password_field: "#login_password".into(),
            login_submit: "#login_control_continue".into(),
            logged_in_marker: "nav.navbar".into(),
            user_menu: "button.up-avatar".into(),
            logout_link: "a[href*='logout']".into(),

            security_question_form: "form[data-qa='security-question-form']".into(),
            security_question_text: "div.up-card-section".into(),

            challenge_frame: "iframe[title='Widget containing a Cloudflare security challenge']"
                .into(),
            challenge_src_marker: "challenge".into(),

            job_card: "section.job-tile".into(),
            job_title_link: "h2 a".into(),
            job_description: ".job-description-text".into(),
            job_posted: "span.job-created-at".into(),
            job_budget: ".up-budget span".into(),
            job_id_attrs: vec!["data-job-id".into(), "id".into()],
        }
    }
}

impl SiteProfile {
    pub fn search_url_for(&self, query: &str) -> String {
        self.search_url
            .replace("{query}", &urlencoding::encode(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_encodes_query() {
        let p = SiteProfile::default();
        let url = p.search_url_for("CI/CD pipelines");
        assert!(url.contains("q=CI%2FCD%20pipelines"));
        assert!(url.ends_with("sort=recency"));
    }
}
