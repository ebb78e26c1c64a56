use std::env;

use sentry_ndk_types::protocol::{Addr, DebugImage, ImageType};
use sentry_ndk_types::{CodeId, DebugId, Uuid};

use findshlibs::{SharedLibrary, SharedLibraryId, TargetSharedLibrary, TARGET_SUPPORTED};

const UUID_SIZE: usize = 16;

#[cfg(any(target_os = "macos", target_os = "ios"))]
const IMAGE_TYPE: ImageType = ImageType::Macho;
#[cfg(windows)]
const IMAGE_TYPE: ImageType = ImageType::Pe;
#[cfg(not(any(target_os = "macos", target_os = "ios", windows)))]
const IMAGE_TYPE: ImageType = ImageType::Elf;

/// Converts an ELF object identifier into a `DebugId`.
///
/// The identifier data is first truncated or extended to match 16 byte size of
/// Uuids. If the data is declared in little endian, the first three Uuid fields
/// are flipped to match the big endian expected by the breakpad processor.
///
/// The `DebugId::appendix` field is always `0` for ELF.
fn debug_id_from_build_id(build_id: &[u8]) -> Option<DebugId> {
    let mut data = [0u8; UUID_SIZE];
    let len = build_id.len().min(UUID_SIZE);
    data[0..len].copy_from_slice(&build_id[0..len]);

    #[cfg(target_endian = "little")]
    {
        data[0..4].reverse();
        data[4..6].reverse();
        data[6..8].reverse();
    }

    Uuid::from_slice(&data).map(DebugId::from_uuid).ok()
}

/// Returns the list of binary images loaded into the process.
///
/// Images without any usable identifier are skipped.  On targets `findshlibs`
/// does not support the list is empty.
pub fn debug_images() -> Vec<DebugImage> {
    let mut images = vec![];
    if !TARGET_SUPPORTED {
        return images;
    }

    TargetSharedLibrary::each(|shlib| {
        let mut uuid = None;
        let maybe_debug_id = shlib.debug_id().and_then(|id| match id {
            SharedLibraryId::Uuid(bytes) => {
                uuid = Some(Uuid::from_bytes(bytes));
                Some(DebugId::from_uuid(Uuid::from_bytes(bytes)))
            }
            SharedLibraryId::GnuBuildId(ref id) => debug_id_from_build_id(id),
            SharedLibraryId::PdbSignature(guid, age) => DebugId::from_guid_age(&guid, age).ok(),
            _ => None,
        });

        let Some(debug_id) = maybe_debug_id else {
            return;
        };

        let mut code_file = shlib.name().to_string_lossy().to_string();
        if code_file.is_empty() {
            code_file = env::current_exe()
                .map(|x| x.display().to_string())
                .unwrap_or_else(|_| "<main>".to_string());
        }

        let code_id = shlib.id().map(|id| CodeId::new(id.to_string()));
        let debug_file = shlib.debug_name().map(|n| n.to_string_lossy().to_string());

        // windows reports the module base as the bias, segments would offset it
        let image_addr = if cfg!(windows) {
            shlib.virtual_memory_bias().0 as u64
        } else {
            shlib.actual_load_addr().0 as u64
        };

        images.push(DebugImage {
            ty: IMAGE_TYPE,
            uuid,
            debug_id,
            debug_file,
            code_id,
            code_file,
            image_addr: Addr(image_addr),
            image_size: shlib.len() as u64,
            arch: Some(env::consts::ARCH.to_string()),
        });
    });

    images
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_id_is_byte_swapped() {
        let build_id = [
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
            0x0f, 0x10, 0x11, 0x12,
        ];
        let debug_id = debug_id_from_build_id(&build_id).unwrap();
        #[cfg(target_endian = "little")]
        assert_eq!(
            debug_id.to_string(),
            "04030201-0605-0807-090a-0b0c0d0e0f10"
        );
        assert_eq!(debug_id.appendix(), 0);
    }

    #[test]
    fn test_short_build_id_is_padded() {
        let debug_id = debug_id_from_build_id(&[0xff; 4]).unwrap();
        assert_eq!(
            debug_id.to_string(),
            "ffffffff-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_debug_images_are_plausible() {
        for image in debug_images() {
            assert!(!image.code_file.is_empty());
            assert_eq!(image.arch.as_deref(), Some(env::consts::ARCH));
        }
    }
}
