//! Support requests (quota, software, group, ...) forwarded to the ticketing
//! bot, with `sendmail` as the fallback channel.

use std::{path::PathBuf, time::Duration};

use reqwest::{Client, Url};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use utils::process::CommandInvocation;

use super::cluster::Cluster;

pub type RequestForm = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Quota,
    Software,
    Group,
    Help,
    GuidedHelp,
    Account,
    Acknowledgement,
}

impl RequestKind {
    pub fn label(self) -> &'static str {
        match self {
            RequestKind::Quota => "Quota",
            RequestKind::Software => "Software",
            RequestKind::Group => "Group",
            RequestKind::Help => "Help",
            RequestKind::GuidedHelp => "GuidedHelp",
            RequestKind::Account => "Account",
            RequestKind::Acknowledgement => "Acknowledgement",
        }
    }

    pub fn subject(self) -> String {
        format!("{}Req", self.label())
    }

    /// Values the forms leave out when a checkbox is not ticked.
    fn defaults(self) -> &'static [(&'static str, &'static str)] {
        match self {
            RequestKind::Quota => &[("confirmBuyin", "no")],
            RequestKind::Software => &[("system_wide", "no")],
            RequestKind::Group => &[("new_group", "False")],
            _ => &[],
        }
    }

    fn log_file(self) -> String {
        format!("{}_log.txt", self.label().to_lowercase())
    }
}

/// Body lines of a group request, in the order the admins' tooling reads them.
const GROUP_FIELDS: &[(&str, &str)] = &[
    ("GroupName", "group_name"),
    ("NewGroupMembersToAdd", "members_to_add"),
    ("GroupDirName", "groupdir"),
    ("addMembers", "addMembers"),
    ("deleteMembers", "deleteMembers"),
    ("addDelegate", "addDelegate"),
    ("removeDelegate", "removeDelegate"),
    ("NewGroup", "new_group"),
    ("DelGroup", "delgroup"),
    ("Comments", "comments"),
];

#[derive(Debug, Error)]
pub enum RequestError {
    /// Neither the bot nor the mail fallback accepted the request.
    #[error("An error has occurred. Please email us at {help_email}")]
    Undelivered { help_email: String },
    #[error("could not build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub user: String,
    pub cluster_name: String,
    pub help_email: String,
    pub request_email: String,
    pub hprcbot_route: Option<String>,
    pub log_dir: PathBuf,
    pub sendmail: PathBuf,
}

#[derive(Clone)]
pub struct RequestRouter {
    client: Client,
    cluster: Cluster,
    settings: RequestSettings,
}

impl RequestRouter {
    pub fn new(cluster: Cluster, settings: RequestSettings) -> Result<Self, RequestError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            cluster,
            settings,
        })
    }

    /// Fill in defaults, log the request and deliver it. Returns the message
    /// shown to the user.
    pub async fn submit(&self, kind: RequestKind, mut form: RequestForm) -> Result<String, RequestError> {
        for (key, value) in kind.defaults() {
            form.entry(*key).or_insert_with(|| Value::from(*value));
        }
        form.entry("cluster_name")
            .or_insert_with(|| Value::from(self.settings.cluster_name.clone()));
        form.insert("user".into(), Value::from(self.settings.user.clone()));
        form.insert("request_type".into(), Value::from(kind.label()));

        let subject = kind.subject();
        let body = compose_body(kind, &form);
        self.append_log(kind, &body).await;

        let delivered = match self.send_to_bot(&form).await {
            Ok(()) => true,
            Err(reason) => {
                tracing::warn!(request = kind.label(), %reason, "ticketing bot unavailable, falling back to mail");
                self.append_log(kind, &format!("\n{reason}\n")).await;
                self.send_mail(&subject, &body).await
            }
        };

        self.append_log(kind, "\n------------------------------------------------\n")
            .await;
        self.append_log(kind, &format!("{}\n", Value::Object(form))).await;

        if delivered {
            Ok(format!(
                "Your {} Request has been sent. A copy of the request has been sent to you via RT",
                kind.label()
            ))
        } else {
            Err(RequestError::Undelivered {
                help_email: self.settings.help_email.clone(),
            })
        }
    }

    async fn send_to_bot(&self, form: &RequestForm) -> Result<(), String> {
        let route = self
            .settings
            .hprcbot_route
            .as_deref()
            .ok_or_else(|| "no ticketing route configured".to_string())?;
        let url = Url::parse(&format!("{}/HPRCapp/OOD", route.trim_end_matches('/')))
            .map_err(|err| format!("invalid ticketing route: {err}"))?;
        self.client
            .post(url)
            .json(form)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| err.to_string())?;
        Ok(())
    }

    async fn send_mail(&self, subject: &str, body: &str) -> bool {
        let message = format!(
            "To: {}\nSubject: {subject}\n\n{}\n",
            self.settings.request_email,
            body.trim().replace("\r\n", "\n")
        );
        let invocation = CommandInvocation::new(self.settings.sendmail.to_string_lossy())
            .arg("-t")
            .stdin(message)
            .timeout(self.cluster.settings().timeout);
        self.cluster.capture(invocation).await.is_ok()
    }

    async fn append_log(&self, kind: RequestKind, text: &str) {
        let path = self.settings.log_dir.join(kind.log_file());
        let result = async {
            tokio::fs::create_dir_all(&self.settings.log_dir).await?;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(text.as_bytes()).await
        }
        .await;
        if let Err(err) = result {
            tracing::warn!(path = %path.display(), error = %err, "could not write request log");
        }
    }
}

fn field<'a>(form: &'a RequestForm, key: &str) -> std::borrow::Cow<'a, str> {
    match form.get(key) {
        Some(Value::String(text)) => text.as_str().into(),
        Some(Value::Null) | None => "".into(),
        Some(other) => other.to_string().into(),
    }
}

/// Plain text body of the request e-mail.
pub fn compose_body(kind: RequestKind, form: &RequestForm) -> String {
    let mut lines = vec![
        format!("User: {}", field(form, "user")),
        format!("Cluster: {}", field(form, "cluster_name")),
    ];
    if kind == RequestKind::Group {
        lines.extend(
            GROUP_FIELDS
                .iter()
                .map(|(label, key)| format!("{label}: {}", field(form, key))),
        );
    } else {
        lines.extend(
            form.keys()
                .filter(|key| !matches!(key.as_str(), "user" | "cluster_name" | "request_type"))
                .map(|key| format!("{key}: {}", field(form, key))),
        );
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use utils::process::ScriptedRunner;

    use super::*;
    use crate::services::cluster::testing;

    fn form(value: Value) -> RequestForm {
        match value {
            Value::Object(map) => map,
            _ => panic!("form must be an object"),
        }
    }

    fn router(
        runner: ScriptedRunner,
        log_dir: &std::path::Path,
        route: Option<&str>,
    ) -> (RequestRouter, Arc<ScriptedRunner>) {
        let (cluster, runner) = testing::cluster(runner);
        let router = RequestRouter::new(
            cluster,
            RequestSettings {
                user: "jdoe".into(),
                cluster_name: "grace".into(),
                help_email: "help@hprc.example".into(),
                request_email: "requests@hprc.example".into(),
                hprcbot_route: route.map(str::to_string),
                log_dir: log_dir.to_path_buf(),
                sendmail: "sendmail".into(),
            },
        )
        .unwrap();
        (router, runner)
    }

    #[test]
    fn group_body_uses_the_fixed_field_order() {
        let form = form(json!({
            "comments": "thanks",
            "group_name": "lab_a",
            "user": "jdoe",
            "cluster_name": "grace",
            "new_group": "True",
        }));
        let body = compose_body(RequestKind::Group, &form);
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "User: jdoe");
        assert_eq!(lines[1], "Cluster: grace");
        assert_eq!(lines[2], "GroupName: lab_a");
        assert_eq!(lines[9], "NewGroup: True");
        assert_eq!(lines[11], "Comments: thanks");
    }

    #[test]
    fn other_bodies_list_fields_in_form_order() {
        let form = form(json!({
            "user": "jdoe",
            "request_type": "Quota",
            "storage": "50TB",
            "confirmBuyin": "no",
        }));
        assert_eq!(
            compose_body(RequestKind::Quota, &form),
            "User: jdoe\nCluster: \nstorage: 50TB\nconfirmBuyin: no"
        );
    }

    #[tokio::test]
    async fn falls_back_to_mail_without_a_ticketing_route() {
        let dir = tempfile::tempdir().unwrap();
        let (router, runner) = router(ScriptedRunner::new().on("sendmail -t", ""), dir.path(), None);

        let message = router
            .submit(RequestKind::Quota, form(json!({"storage": "50TB"})))
            .await
            .unwrap();
        assert!(message.starts_with("Your Quota Request has been sent."));
        assert_eq!(runner.calls(), vec!["sendmail -t".to_string()]);

        let log = std::fs::read_to_string(dir.path().join("quota_log.txt")).unwrap();
        assert!(log.contains("storage: 50TB"));
        assert!(log.contains(r#""confirmBuyin":"no""#));
    }

    #[tokio::test]
    async fn unreachable_bot_and_failing_mail_is_undelivered() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = router(
            ScriptedRunner::new().on_failure("sendmail -t", 75, "", "queue full"),
            dir.path(),
            Some("http://127.0.0.1:9"),
        );
        let err = router
            .submit(RequestKind::Help, RequestForm::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "An error has occurred. Please email us at help@hprc.example"
        );
    }
}
