//! Image management commands.
//!
//! - `ciao-image create` - Register an image (state `queued`)
//! - `ciao-image list` - Images owned by a tenant plus public ones
//! - `ciao-image show` - One image
//! - `ciao-image upload` - Stream a file into an image
//! - `ciao-image update` - Replace name, visibility, type or tags
//! - `ciao-image delete` - Remove an image and its content

use anyhow::{Context, Result};
use ciao_image::validation::validate_image_name;
use ciao_image::{Image, ImageCache, Visibility};
use std::fmt::Write as _;
use std::path::Path;

use super::format_size;
use crate::{CreateArgs, UpdateArgs};

/// Execute `create`.
pub async fn create(cache: &ImageCache, args: CreateArgs) -> Result<()> {
    let image = create_image(cache, args).await?;
    println!("Created image {} ({})", image.id, image.name);
    Ok(())
}

/// Execute `list`.
pub async fn list(cache: &ImageCache, tenant: &str, json: bool) -> Result<()> {
    let mut images = cache.get_all_images(tenant).await?;
    images.sort_by(|a, b| {
        a.create_time
            .cmp(&b.create_time)
            .then_with(|| a.id.cmp(&b.id))
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&images)?);
    } else if images.is_empty() {
        println!("No images.");
    } else {
        print!("{}", render_table(&images));
    }
    Ok(())
}

/// Execute `show`.
pub async fn show(cache: &ImageCache, tenant: &str, id: &str, json: bool) -> Result<()> {
    let image = cache.get_image(tenant, id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&image)?);
    } else {
        print!("{}", render_details(&image));
    }
    Ok(())
}

/// Execute `upload`.
pub async fn upload(cache: &ImageCache, tenant: &str, id: &str, file: &Path) -> Result<()> {
    let body = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Failed to open image file: {}", file.display()))?;

    cache
        .upload_image(tenant, id, body)
        .await
        .with_context(|| format!("Upload of image {id} failed"))?;

    let image = cache.get_image(tenant, id).await?;
    println!("Uploaded {} to image {id}", format_size(image.size));
    Ok(())
}

/// Execute `update`.
pub async fn update(cache: &ImageCache, args: UpdateArgs) -> Result<()> {
    let image = update_image(cache, args).await?;
    println!("Updated image {}", image.id);
    Ok(())
}

/// Execute `delete`.
pub async fn delete(cache: &ImageCache, tenant: &str, id: &str) -> Result<()> {
    cache.delete_image(tenant, id).await?;
    println!("Deleted image {id}");
    Ok(())
}

async fn create_image(cache: &ImageCache, args: CreateArgs) -> Result<Image> {
    validate_image_name(&args.name)?;
    check_privilege(args.visibility, args.admin)?;

    let id = args
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut image = Image::new(id, args.tenant, args.name, args.visibility);
    image.image_type = args.image_type;
    image.tags = args.tags;

    cache.create_image(image.clone()).await?;
    Ok(image)
}

async fn update_image(cache: &ImageCache, args: UpdateArgs) -> Result<Image> {
    let mut image = cache.get_image(&args.tenant, &args.id).await?;

    if let Some(name) = args.name {
        validate_image_name(&name)?;
        image.name = name;
    }
    if let Some(visibility) = args.visibility {
        if visibility != image.visibility {
            check_privilege(visibility, args.admin)?;
        }
        image.visibility = visibility;
    }
    if let Some(image_type) = args.image_type {
        image.image_type = image_type;
    }
    if let Some(tags) = args.tags {
        image.tags = tags;
    }

    cache.update_image(image.clone()).await?;
    Ok(image)
}

fn check_privilege(visibility: Visibility, admin: bool) -> Result<()> {
    if visibility.requires_privilege() && !admin {
        anyhow::bail!("Only admins can create {visibility} images (pass --admin)");
    }
    Ok(())
}

fn render_table(images: &[Image]) -> String {
    let id_width = images
        .iter()
        .map(|i| i.id.len())
        .max()
        .unwrap_or(0)
        .max("ID".len());
    let name_width = images
        .iter()
        .map(|i| i.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:<name_width$}  {:<14}  {:<10}  {:>10}",
        "ID", "NAME", "STATUS", "VISIBILITY", "SIZE"
    );
    for image in images {
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<name_width$}  {:<14}  {:<10}  {:>10}",
            image.id,
            image.name,
            image.state.status().to_string(),
            image.visibility.to_string(),
            format_size(image.size)
        );
    }
    out
}

fn render_details(image: &Image) -> String {
    let owner = if image.tenant_id.is_empty() {
        "(cluster)"
    } else {
        image.tenant_id.as_str()
    };

    let mut out = String::new();
    let _ = writeln!(out, "ID:          {}", image.id);
    let _ = writeln!(out, "Name:        {}", image.name);
    let _ = writeln!(out, "Status:      {}", image.state.status());
    let _ = writeln!(out, "Visibility:  {}", image.visibility);
    let _ = writeln!(out, "Owner:       {owner}");
    let _ = writeln!(out, "Type:        {}", image.image_type);
    let _ = writeln!(out, "Size:        {}", format_size(image.size));
    let _ = writeln!(out, "Created:     {}", image.create_time.to_rfc3339());
    if !image.tags.is_empty() {
        let _ = writeln!(out, "Tags:        {}", image.tags);
    }
    out
}
