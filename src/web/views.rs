use super::api::qr_png;
use super::prelude::*;
use base64::Engine;
use base64::engine::general_purpose;

#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub(crate) struct IndexTemplate {
    pub(crate) prompt: String,
    pub(crate) error: Option<String>,
    pub(crate) composites: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "result.html")]
pub(crate) struct ResultTemplate {
    pub(crate) prompt: String,
    pub(crate) final_prompt: String,
    pub(crate) public_url: String,
    pub(crate) blob_path: String,
    pub(crate) qr_data_uri: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct PromptForm {
    #[serde(default)]
    prompt: String,
}

/// handles the / GET
pub(crate) async fn index_handler(State(state): State<AppState>) -> IndexTemplate {
    IndexTemplate {
        prompt: String::new(),
        error: None,
        composites: state.pipeline.composites(),
    }
}

/// handles the / POST, rendering the image and its QR code
pub(crate) async fn index_post(
    State(state): State<AppState>,
    Form(form): Form<PromptForm>,
) -> Response {
    let composites = state.pipeline.composites();
    let failed = |err: ArtmindError, prompt: String| {
        let (status, message) = err.status_and_message();
        (
            status,
            IndexTemplate {
                prompt,
                error: Some(message),
                composites,
            },
        )
            .into_response()
    };

    let outcome = match state.pipeline.run(&form.prompt).await {
        Ok(outcome) => outcome,
        Err(err) => return failed(err.into(), form.prompt),
    };
    let qr = match qr_png(outcome.stored.public_url.clone()).await {
        Ok(qr) => qr,
        Err(err) => return failed(err, form.prompt),
    };

    ResultTemplate {
        prompt: form.prompt,
        final_prompt: outcome.final_prompt,
        public_url: outcome.stored.public_url,
        blob_path: outcome.stored.blob_path,
        qr_data_uri: format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(qr)
        ),
    }
    .into_response()
}
