//! Simulated board behaviour as seen through the `AcquisitionBoard` trait.

use std::time::Duration;

use daq_board::{
    AcquisitionBoard, AcquisitionConfig, BoardCapabilities, BoardError, InputMode, InputRange,
    InterruptSource, SimFault, SimOptions, SimWaveform, SimulatedBoard,
};

fn poll_once(fd: i32, timeout_ms: i32) -> libc::c_short {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    assert!(rc >= 0, "poll failed");
    pfd.revents
}

fn start(board: &mut dyn AcquisitionBoard) {
    let channels = board.geometry().unwrap().channels;
    for channel in 0..channels {
        board.start_dma(channel).unwrap();
    }
    board.arm_triggers().unwrap();
    board.program_rate().unwrap();
    board.initialize_and_start().unwrap();
}

fn sequence_board(id: u32) -> SimulatedBoard {
    SimulatedBoard::open_with(
        id,
        BoardCapabilities::default(),
        SimOptions {
            waveform: SimWaveform::Sequence,
            ..SimOptions::default()
        },
    )
    .unwrap()
}

#[test]
fn test_configure_rejects_out_of_range_parameters() {
    let mut board = SimulatedBoard::open(0).unwrap();

    let err = board
        .configure(&AcquisitionConfig {
            sample_rate: 5.0e6,
            ..AcquisitionConfig::default()
        })
        .unwrap_err();
    assert!(err.is_invalid_rate());

    let err = board
        .configure(&AcquisitionConfig {
            buffer_depth: 1000,
            ..AcquisitionConfig::default()
        })
        .unwrap_err();
    assert!(err.is_invalid_buffer_size());
    assert!(board.resolved().is_none());
}

#[test]
fn test_configure_while_running_is_busy() {
    let mut board = SimulatedBoard::open(2).unwrap();
    board.configure(&AcquisitionConfig::default()).unwrap();
    start(&mut board);

    assert!(matches!(
        board.configure(&AcquisitionConfig::default()),
        Err(BoardError::Busy { board: 2 })
    ));
    board.stop().unwrap();
    assert!(board.configure(&AcquisitionConfig::default()).is_ok());
}

#[test]
fn test_differential_mode_halves_channels() {
    let mut board = SimulatedBoard::open(0).unwrap();
    let resolved = board
        .configure(&AcquisitionConfig {
            mode: InputMode::Differential,
            ..AcquisitionConfig::default()
        })
        .unwrap();
    assert_eq!(resolved.geometry.channels, 4);
    assert!(board.start_dma(3).is_ok());
    assert!(matches!(
        board.start_dma(4),
        Err(BoardError::InvalidChannel { channel: 4, max: 4 })
    ));
}

#[test]
fn test_interrupt_fd_readable_while_pending() {
    let mut board = sequence_board(4);
    board.configure(&AcquisitionConfig::default()).unwrap();
    let fd = board.interrupt_fd();
    assert_eq!(poll_once(fd, 0), 0);

    start(&mut board);
    assert_ne!(poll_once(fd, 0) & libc::POLLIN, 0);

    let record = board.next_interrupt().unwrap();
    assert_eq!(record.source, InterruptSource::EngineStarted);
    assert_eq!(poll_once(fd, 0), 0);

    board.controller().complete_buffer().unwrap();
    assert_ne!(poll_once(fd, 0) & libc::POLLIN, 0);
}

#[test]
fn test_waker_unparks_poll_without_queueing() {
    let mut board = SimulatedBoard::open(5).unwrap();
    board.configure(&AcquisitionConfig::default()).unwrap();
    let fd = board.interrupt_fd();
    let waker = board.waker();

    let handle = std::thread::spawn(move || poll_once(fd, 5_000));
    std::thread::sleep(Duration::from_millis(20));
    waker.wake().unwrap();

    let revents = handle.join().unwrap();
    assert_ne!(revents & libc::POLLIN, 0);
    assert!(!board.next_interrupt().unwrap().valid);
    assert_eq!(poll_once(fd, 0), 0);
}

#[test]
fn test_hang_up_reports_pollhup() {
    let board = SimulatedBoard::open(6).unwrap();
    board.controller().inject(SimFault::HangUp);
    assert_ne!(poll_once(board.interrupt_fd(), 0) & libc::POLLHUP, 0);
}

#[test]
fn test_raw_samples_convert_with_configured_range() {
    let mut board = sequence_board(8);
    let resolved = board
        .configure(&AcquisitionConfig {
            samples_per_buffer: 8,
            range: InputRange::Bipolar5V,
            ..AcquisitionConfig::default()
        })
        .unwrap()
        .clone();
    start(&mut board);

    let controller = board.controller();
    controller.complete_buffers(3).unwrap();

    let mut raw = [0i16; 8];
    board.copy_buffer(0, 2, &mut raw).unwrap();
    assert_eq!(raw, [2; 8]);
    assert_eq!(resolved.to_volts(raw[0]), 2.0 * InputRange::Bipolar5V.lsb(16));
}

#[test]
fn test_start_failure_fault() {
    let mut board = SimulatedBoard::open(9).unwrap();
    board.configure(&AcquisitionConfig::default()).unwrap();
    board.controller().inject(SimFault::StartFailure);

    for channel in 0..8 {
        board.start_dma(channel).unwrap();
    }
    board.arm_triggers().unwrap();
    board.program_rate().unwrap();
    assert!(matches!(
        board.initialize_and_start(),
        Err(BoardError::StartFailed { board: 9, .. })
    ));
    assert!(!board.is_started());
    assert!(board.initialize_and_start().is_ok());
}
