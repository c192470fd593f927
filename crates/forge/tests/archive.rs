//! End-to-end archive build/read-back (§8 scenario 6), driven through the
//! public `ArchiveBuilder` + `BasicBuildJob` surface rather than the
//! container codec directly.

use forge::archive::{Archive, ArchiveBuilder, BasicBuildJob, Compression, FileDesc, FourCC, SubFileDesc};
use forge::jobs::JobScheduler;

#[test]
fn archive_round_trip_matches_scenario_six() {
    let scheduler = JobScheduler::new(2);
    let builder = ArchiveBuilder::new();

    let texture = BasicBuildJob::new(
        &scheduler,
        FileDesc {
            type_tag: FourCC::from_str("TEX "),
            name: "tex.ktx".into(),
            inline_data: Vec::new(),
            sub_files: vec![SubFileDesc { identifier: FourCC::from_str("000"), compression: Compression::GDeflate, data: vec![0xAB; 256] }],
        },
    );
    let shader = BasicBuildJob::new(
        &scheduler,
        FileDesc {
            type_tag: FourCC::from_str("SHDR"),
            name: "shd.spv".into(),
            inline_data: Vec::new(),
            sub_files: vec![SubFileDesc { identifier: FourCC::from_str("SPIR"), compression: Compression::Deflate, data: vec![0x5A; 128] }],
        },
    );

    assert!(builder.add_job(texture));
    assert!(builder.add_job(shader));

    let bytes = builder.build().expect("archive build should succeed");
    let archive = Archive::parse(&bytes).expect("built archive should parse");

    assert_eq!(archive.files().len(), 2);

    let tex = &archive.files()[0];
    assert_eq!(tex.name, "tex.ktx");
    assert_eq!(archive.read_sub_file(&tex.sub_files[0]).unwrap(), vec![0xAB; 256]);

    let shd = &archive.files()[1];
    assert_eq!(shd.name, "shd.spv");
    assert_eq!(archive.read_sub_file(&shd.sub_files[0]).unwrap(), vec![0x5A; 128]);
}
