#![no_main]

use libfuzzer_sys::fuzz_target;
use pescope::Image;

fuzz_target!(|data: &[u8]| {
    // Every query must prune malformed content instead of panicking.
    if let Ok(image) = Image::parse(data) {
        let _ = image.dos_header();
        let _ = image.rich_header();
        let _ = image.nt_header();
        let _ = image.data_directories();
        let _ = image.section_headers();
        let _ = image.export();
        let _ = image.import();
        let _ = image.resources_flat();
        let _ = image.exceptions();
        let _ = image.security();
        let _ = image.relocations();
        let _ = image.debug_directory();
        let _ = image.tls();
        let _ = image.load_config();
        let _ = image.bound_import();
        let _ = image.delay_import();
        let _ = image.com_descriptor();
    }
});
