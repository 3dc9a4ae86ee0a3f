use crate::data::{DocumentAsset, DocumentKind, ImageAsset};

pub(crate) struct AnnexPartition<'a> {
    pub plans: Vec<&'a DocumentAsset>,
    pub others: Vec<&'a DocumentAsset>,
}

/// Splits the annex into plan documents (which may get a rendered preview)
/// and plain listed documents. The flag and client-logo sentinels never
/// appear in the annex.
pub(crate) fn partition(documents: &[DocumentAsset]) -> AnnexPartition<'_> {
    let mut plans = Vec::new();
    let mut others = Vec::new();
    for document in documents {
        match document.kind {
            DocumentKind::Flag | DocumentKind::ClientLogo => continue,
            DocumentKind::Plan => plans.push(document),
            DocumentKind::Other => {
                if document.base_name().contains("plan") {
                    plans.push(document);
                } else {
                    others.push(document);
                }
            }
        }
    }
    AnnexPartition { plans, others }
}

/// Best-effort illustration lookup: the first image whose name contains the
/// literal token "plan" or the document's own base filename wins. There is no
/// tie-break beyond list order; this is a heuristic, not a contract.
pub(crate) fn match_plan_image<'a>(
    document: &DocumentAsset,
    images: &'a [ImageAsset],
) -> Option<&'a ImageAsset> {
    let base = document.base_name();
    images.iter().find(|image| {
        let name = image.name.to_lowercase();
        name.contains("plan") || (!base.is_empty() && name.contains(&base))
    })
}
