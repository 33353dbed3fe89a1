use serde::Serialize;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const DATA_FIELD: &str = "DATA";

/// Parser input extracted from a request body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DevicePayload {
    /// Text handed to the parser.
    pub text: String,
    /// Decoded form fields, empty unless the body was a form carrying `DATA`.
    pub form: Vec<(String, String)>,
}

impl DevicePayload {
    pub fn from_request(content_type: Option<&str>, body: &[u8]) -> DevicePayload {
        let raw = String::from_utf8_lossy(body).into_owned();

        let is_form = content_type
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
            .unwrap_or(false);
        if !is_form {
            return DevicePayload {
                text: raw,
                form: Vec::new(),
            };
        }

        match serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
            Ok(form) => match form.iter().rev().find(|(key, _)| key == DATA_FIELD) {
                Some((_, data)) => DevicePayload {
                    text: data.clone(),
                    form,
                },
                None => DevicePayload {
                    text: raw,
                    form: Vec::new(),
                },
            },
            Err(err) => {
                tracing::debug!("form body could not be decoded, using it verbatim: {}", err);
                DevicePayload {
                    text: raw,
                    form: Vec::new(),
                }
            }
        }
    }
}
