use crate::builder::{StageRequest, StagingContext};
use crate::error::{Result, StageError};
use crate::manifest::FileClass;
use crate::path_safety::join_rel;
use crate::source::SourceProvider;
use std::path::Path;
use unic_langid::LanguageIdentifier;

/// `_`-joined culture names to look for, most specific first. With segments
/// `a_b_c`: the full tag, `a_c`, `a_b`, then `a`.
///
/// `zh-Hant-TW` -> `zh_Hant_TW`, `zh_TW`, `zh_Hant`, `zh`.
/// `ca-ES-valencia` -> `ca_ES_valencia`, `ca_valencia`, `ca_ES`, `ca`.
pub fn parent_cultures(tag: &str) -> Result<Vec<String>> {
    let langid: LanguageIdentifier = tag
        .replace('_', "-")
        .parse()
        .map_err(|e| StageError::config(format!("bad culture tag {tag:?}: {e}")))?;
    let mut segs = vec![langid.language.as_str().to_string()];
    segs.extend(langid.script.map(|s| s.as_str().to_string()));
    segs.extend(langid.region.map(|r| r.as_str().to_string()));
    segs.extend(langid.variants().map(|v| v.as_str().to_string()));

    let mut out = vec![segs.join("_")];
    if segs.len() > 2 {
        out.push(format!("{}_{}", segs[0], segs[2]));
    }
    if segs.len() > 1 {
        out.push(format!("{}_{}", segs[0], segs[1]));
    }
    out.push(segs[0].clone());
    out.dedup();
    Ok(out)
}

/// Stage `*.locres` files from every directory of `source_dir` that names
/// `culture` or one of its parents. Returns the updated context and the file count.
pub fn stage_culture(
    ctx: StagingContext,
    src: &dyn SourceProvider,
    culture: &str,
    source_dir: &Path,
    dest_dir: Option<&str>,
    remap: bool,
) -> Result<(StagingContext, usize)> {
    let wanted: Vec<String> =
        parent_cultures(culture)?.into_iter().map(|c| c.to_lowercase()).collect();
    if !src.exists(source_dir) {
        return Ok((ctx, 0));
    }
    let mut ctx = ctx;
    let mut total = 0usize;
    for dir in src.subdirectories(source_dir)? {
        let canonical = dir.replace('-', "_").to_lowercase();
        if !wanted.contains(&canonical) {
            continue;
        }
        let mut req = StageRequest::new(FileClass::Ufs, source_dir.join(&dir))
            .pattern("*.locres")
            .remap(remap);
        if let Some(d) = dest_dir {
            req = req.dest(join_rel(&[d, dir.as_str()]));
        }
        let (next, n) = ctx.stage_files(src, &req)?;
        ctx = next;
        total += n;
    }
    tracing::debug!("culture {} staged {} file(s) from {}", culture, total, source_dir.display());
    Ok((ctx, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_of_simple_tags() {
        assert_eq!(parent_cultures("en-US").unwrap(), vec!["en_US", "en"]);
        assert_eq!(parent_cultures("en_US").unwrap(), vec!["en_US", "en"]);
        assert_eq!(parent_cultures("fr").unwrap(), vec!["fr"]);
    }

    #[test]
    fn parents_of_script_and_region() {
        assert_eq!(
            parent_cultures("zh-Hant-TW").unwrap(),
            vec!["zh_Hant_TW", "zh_TW", "zh_Hant", "zh"]
        );
    }

    #[test]
    fn parents_of_region_and_variant() {
        assert_eq!(
            parent_cultures("ca-ES-valencia").unwrap(),
            vec!["ca_ES_valencia", "ca_valencia", "ca_ES", "ca"]
        );
        assert_eq!(parent_cultures("sr-Latn").unwrap(), vec!["sr_Latn", "sr"]);
    }

    #[test]
    fn malformed_tag() {
        assert!(parent_cultures("not a culture!").is_err());
    }
}
