use tracing::info;

use crate::{
    auth::policy::{can_manage_site, ensure, Actor},
    error::{AppError, AppResult},
    media::{store_image, MediaStorage, Upload},
    store::{BannerSlot, SiteSettings, Store},
};

pub async fn get_site(store: &dyn Store) -> AppResult<SiteSettings> {
    Ok(store.site_settings().await?)
}

pub fn parse_slot(raw: &str) -> AppResult<BannerSlot> {
    BannerSlot::parse(raw)
        .ok_or_else(|| AppError::validation("Banner slot must be one of main, left, right"))
}

/// Stores the image and points `slot` at it. Returns the new URL together
/// with the updated settings.
pub async fn upload_banner(
    store: &dyn Store,
    media: &dyn MediaStorage,
    actor: &Actor,
    slot: BannerSlot,
    image: Option<Upload>,
) -> AppResult<(String, SiteSettings)> {
    ensure(actor, can_manage_site(actor), "Admin access required")?;
    let image = image.ok_or_else(|| AppError::validation("No banner image uploaded"))?;

    let url = store_image(media, "banners", image).await?;
    let settings = store.set_banner(slot, &url).await?;
    info!(slot = slot.as_str(), %url, "site banner updated");
    Ok((url, settings))
}
