use std::path::Path;

use serde::Serialize;
use utils::{text::fields, validate};

use super::{
    cluster::{Cluster, ClusterError, Fetched},
    table::ParseError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDirectory {
    pub group: String,
    pub directory: String,
    pub owner: Option<String>,
}

/// Unix groups as printed by `id -Gn`.
pub fn parse_group_list(text: &str) -> Result<Vec<String>, ParseError> {
    Ok(text.split_whitespace().map(str::to_string).collect())
}

/// Locate `group` in an `ls -la <root>` listing.
///
/// The first entry named exactly `group` wins. Its third column is the
/// owner and a symlink target replaces the directory. Without a match the
/// directory is assumed to be `<root>/<group>` and the owner is unknown.
pub fn find_group_directory(listing: &str, group: &str, root: &Path) -> GroupDirectory {
    let default = root.join(group).to_string_lossy().into_owned();
    let entry = listing.lines().find_map(|line| {
        let cells = fields(line);
        (cells.len() >= 9 && cells[8] == group).then_some((line, cells))
    });

    let Some((line, cells)) = entry else {
        return GroupDirectory {
            group: group.to_string(),
            directory: default,
            owner: None,
        };
    };

    let directory = match line.split_once("->") {
        Some((_, target)) if !target.trim().is_empty() => {
            root.join(target.trim()).to_string_lossy().into_owned()
        }
        _ => default,
    };
    GroupDirectory {
        group: group.to_string(),
        directory,
        owner: Some(cells[2].to_string()),
    }
}

impl Cluster {
    pub async fn user_groups(&self, user: &str) -> Result<Fetched<Vec<String>>, ClusterError> {
        let user = validate::user_name(user)?;
        self.fetch(self.command("id").args(["-Gn", user]), parse_group_list)
            .await
    }

    pub async fn group_directory(
        &self,
        group: &str,
        root: &Path,
    ) -> Result<Fetched<GroupDirectory>, ClusterError> {
        let group = validate::group_name(group)?;
        let invocation = self
            .command("ls")
            .arg("-la")
            .arg(root.to_string_lossy());
        self.fetch(invocation, |listing| {
            Ok(find_group_directory(listing, group, root))
        })
        .await
    }
}
