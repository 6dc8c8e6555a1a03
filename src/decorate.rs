// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Main-content decoration shared by the page and by fragments.

use crate::core::error::{PageFlowError, Result};
use crate::core::traits::Decorator;
use crate::dom::Element;

/// Name of the synthetic block built from the leading heading and image.
pub const HERO_BLOCK: &str = "hero";

/// Decorates a main-content container: buttons, icons, synthetic blocks,
/// then sections and blocks.
pub fn decorate_main(main: &Element, decorator: &dyn Decorator) {
    decorator.decorate_buttons(main);
    decorator.decorate_icons(main);
    build_auto_blocks(main, decorator);
    decorator.decorate_sections(main);
    decorator.decorate_blocks(main);
}

/// Builds every synthetic block. Failures are logged and swallowed.
pub fn build_auto_blocks(main: &Element, decorator: &dyn Decorator) {
    if let Err(e) = build_hero_block(main, decorator) {
        log::error!("Auto Blocking failed: {}", e);
    }
}

/// Wraps the first `h1` and the first picture into a hero block, prepended
/// to `main` as a new section, when the heading comes first in document
/// order. Returns whether a block was built.
pub fn build_hero_block(
    main: &Element,
    decorator: &dyn Decorator,
) -> Result<bool> {
    let Some(heading) = main.find_tag("h1") else {
        return Ok(false);
    };
    let Some(picture) = main
        .find_tag("picture")
        .or_else(|| main.find_tag("img"))
    else {
        return Ok(false);
    };
    if heading.precedes(&picture, main) != Some(true) {
        return Ok(false);
    }

    let block = decorator
        .build_block(HERO_BLOCK, vec![picture, heading])
        .map_err(|e| PageFlowError::AutoBlock {
            block: HERO_BLOCK.to_string(),
            message: e.to_string(),
        })?;
    let section = Element::new("div");
    section.append(&block);
    main.prepend(&section);
    log::debug!("Built {} block", HERO_BLOCK);
    Ok(true)
}
