use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use folio_types::error::Result;

use super::EntryKind;

pub const MEDIA_DIR: &str = "media";
pub const FOLDER_MANIFEST: &str = "folder.json";

#[derive(Serialize)]
struct FolderManifest<'a> {
    alias: &'a str,
    account_id: &'a str,
    created: DateTime<Utc>,
}

/// Write the initial folder layout into `root` and return its size in bytes.
///
/// `folder.json` carries the account identity, so two accounts bootstrapped
/// from the same skeleton still get distinct snapshot ids.
pub fn write_skeleton(
    root: &Path,
    alias: &str,
    account_id: &str,
    created: DateTime<Utc>,
) -> Result<u64> {
    for kind in EntryKind::ALL {
        fs::create_dir_all(root.join(kind.dir_name()))?;
    }
    fs::create_dir_all(root.join(MEDIA_DIR))?;

    let index = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{alias}</title></head>\n<body>\n\
         <h1>{alias}</h1>\n<ul>\n\
         <li><a href=\"websites/\">websites</a></li>\n\
         <li><a href=\"zip-websites/\">zip-websites</a></li>\n\
         <li><a href=\"files/\">files</a></li>\n\
         <li><a href=\"media/\">media</a></li>\n\
         </ul>\n</body>\n</html>\n"
    );
    let readme = format!(
        "# {alias}\n\n\
         websites/      sites built from uploaded files\n\
         zip-websites/  sites built from uploaded archives\n\
         files/         individual files\n\
         media/         media assets\n"
    );
    let manifest = serde_json::to_vec_pretty(&FolderManifest {
        alias,
        account_id,
        created,
    })?;

    fs::write(root.join("index.html"), &index)?;
    fs::write(root.join("README.md"), &readme)?;
    fs::write(root.join(FOLDER_MANIFEST), &manifest)?;

    Ok((index.len() + readme.len() + manifest.len()) as u64)
}
