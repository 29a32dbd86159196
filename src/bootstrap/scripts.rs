//! JavaScript injected into the embedded login page.
//!
//! Every dynamic value is emitted as a JSON string literal, which is also a
//! valid JavaScript literal, so quotes or `</script>` in a password cannot
//! escape into the page.

use serde::Deserialize;

/// Message channel exposed by the hosting web view.
pub const DEFAULT_MESSAGE_CHANNEL: &str = "window.ReactNativeWebView.postMessage";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeScript {
    /// Fill the EMR login form and press submit.
    FillLoginForm {
        username: String,
        password: String,
        pin: String,
    },
    /// Press the approve button on the OAuth consent page.
    AuthorizeOAuth,
    /// Fetch `url` with the page's cookies and post the result back tagged with `id`.
    FetchJson { id: String, url: String },
}

impl BridgeScript {
    pub fn render(&self) -> String {
        self.render_with_channel(DEFAULT_MESSAGE_CHANNEL)
    }

    /// Render using `channel` as the function that posts messages to the host.
    pub fn render_with_channel(&self, channel: &str) -> String {
        match self {
            Self::FillLoginForm {
                username,
                password,
                pin,
            } => format!(
                r#"(function() {{
    document.getElementById('username').value = {username};
    document.getElementById('password2').value = {password};
    document.getElementById('pin').value = {pin};
    document.getElementById('pin2').value = {pin};
    var submit = document.querySelector('button[type="submit"][name="submit"].btn.btn-primary.btn-block');
    if (submit) {{ submit.click(); }} else {{ console.error('Submit button not found'); }}
}})();
true;"#,
                username = js_string(username),
                password = js_string(password),
                pin = js_string(pin),
            ),
            Self::AuthorizeOAuth => r#"(function() {
    var approve = document.querySelector('input[type="submit"].btn.btn-primary');
    if (approve) { approve.click(); } else { console.error('Authorize button not found'); }
})();
true;"#
                .to_string(),
            Self::FetchJson { id, url } => format!(
                r#"(function() {{
    var id = {id};
    fetch({url}, {{ credentials: 'include' }})
        .then(function(response) {{
            return response.text().then(function(body) {{
                {channel}(JSON.stringify({{ id: id, ok: response.ok, status: response.status, body: body }}));
            }});
        }})
        .catch(function(error) {{
            {channel}(JSON.stringify({{ id: id, ok: false, error: String(error) }}));
        }});
}})();
true;"#,
                id = js_string(id),
                url = js_string(url),
            ),
        }
    }
}

/// Reply posted back by a [`BridgeScript::FetchJson`] script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchReply {
    pub id: String,
    pub ok: bool,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl FetchReply {
    /// Parse a posted message; anything that is not a fetch reply yields `None`.
    pub fn parse(message: &str) -> Option<Self> {
        serde_json::from_str(message).ok()
    }
}

fn js_string(value: &str) -> String {
    // JSON escaping leaves `<` and `/` alone; escape `</` so the literal is safe in HTML too.
    serde_json::Value::from(value)
        .to_string()
        .replace("</", "<\\/")
}
